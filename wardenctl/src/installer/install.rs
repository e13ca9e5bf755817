//! Dependency provisioning
//!
//! Ensures the external tools the pipeline drives are installed through the
//! platform package manager and that their services are enabled and running.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::step::{StepName, StepResult};
use crate::process::{CommandRunner, CommandSpec};

/// An external tool the deployment needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Display name used in reports
    pub name: String,

    /// Command whose success means the tool is present
    pub probe: Vec<String>,

    /// Packages that provide the tool
    pub packages: Vec<String>,

    /// systemd unit to enable and start, if the tool runs as a service
    #[serde(default)]
    pub service: Option<String>,
}

impl ToolSpec {
    pub fn new(name: &str, probe: &[&str], packages: &[&str], service: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            probe: probe.iter().map(|s| s.to_string()).collect(),
            packages: packages.iter().map(|s| s.to_string()).collect(),
            service: service.map(str::to_string),
        }
    }

    /// Tools needed for a Vaultwarden + nginx + certbot deployment on Debian/Ubuntu
    pub fn default_tools() -> Vec<ToolSpec> {
        vec![
            ToolSpec::new("docker", &["docker", "--version"], &["docker.io"], Some("docker")),
            ToolSpec::new(
                "docker-compose",
                &["docker", "compose", "version"],
                &["docker-compose-v2"],
                None,
            ),
            ToolSpec::new("nginx", &["nginx", "-v"], &["nginx"], Some("nginx")),
            ToolSpec::new("certbot", &["certbot", "--version"], &["certbot"], None),
            ToolSpec::new(
                "certbot-dns-cloudflare",
                &["dpkg", "-s", "python3-certbot-dns-cloudflare"],
                &["python3-certbot-dns-cloudflare"],
                None,
            ),
            ToolSpec::new("openssl", &["openssl", "version"], &["openssl"], None),
        ]
    }

    fn probe_command(&self) -> Option<CommandSpec> {
        let (program, args) = self.probe.split_first()?;
        Some(CommandSpec::new(program.clone()).args(args.iter().cloned()))
    }
}

/// Check whether a tool is present. A probe that cannot run means absent.
pub async fn is_present(runner: &dyn CommandRunner, tool: &ToolSpec) -> bool {
    let Some(spec) = tool.probe_command() else {
        return false;
    };
    match runner.run(&spec.timeout(Duration::from_secs(30))).await {
        Ok(output) => output.success(),
        Err(e) => {
            debug!(tool = %tool.name, error = %e, "Probe could not run");
            false
        }
    }
}

/// Ensure every tool is installed and its service running
pub async fn ensure_dependencies(
    runner: &dyn CommandRunner,
    tools: &[ToolSpec],
    timeout: Duration,
) -> StepResult {
    if tools.is_empty() {
        return StepResult::skipped(StepName::Dependencies, "no tools configured");
    }
    StepResult::from_outcome(
        StepName::Dependencies,
        ensure_dependencies_impl(runner, tools, timeout).await,
    )
}

async fn ensure_dependencies_impl(
    runner: &dyn CommandRunner,
    tools: &[ToolSpec],
    timeout: Duration,
) -> Result<String, DeployError> {
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for tool in tools {
        if is_present(runner, tool).await {
            debug!(tool = %tool.name, "Already installed, skipping");
            present.push(tool);
        } else {
            missing.push(tool);
        }
    }

    if !missing.is_empty() {
        let update = apt_get(["update"]).timeout(timeout);
        run_install_step(runner, &update, "package index").await?;
    }

    for tool in &missing {
        info!(tool = %tool.name, packages = ?tool.packages, "Installing");
        let install = apt_get(["install", "-y", "--no-install-recommends"])
            .args(tool.packages.iter().cloned())
            .timeout(timeout);
        run_install_step(runner, &install, &tool.name).await?;

        if !is_present(runner, tool).await {
            return Err(DeployError::DependencyInstallError {
                tool: tool.name.clone(),
                diagnostic: "installed packages but the tool is still not available".to_string(),
            });
        }
    }

    for tool in present.iter().chain(missing.iter()) {
        if let Some(unit) = &tool.service {
            let enable = CommandSpec::new("systemctl")
                .args(["enable", "--now", unit.as_str()])
                .timeout(timeout);
            run_install_step(runner, &enable, &tool.name).await?;
        }
    }

    Ok(format!(
        "installed: [{}]; already present: [{}]",
        join_names(&missing),
        join_names(&present)
    ))
}

fn apt_get<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new("apt-get")
        .args(args)
        .env("DEBIAN_FRONTEND", "noninteractive")
}

async fn run_install_step(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    tool: &str,
) -> Result<(), DeployError> {
    let output = runner
        .run(spec)
        .await
        .map_err(|e| DeployError::DependencyInstallError {
            tool: tool.to_string(),
            diagnostic: e.to_string(),
        })?;
    if !output.success() {
        return Err(DeployError::DependencyInstallError {
            tool: tool.to_string(),
            diagnostic: output.diagnostic(),
        });
    }
    Ok(())
}

fn join_names(tools: &[&ToolSpec]) -> String {
    tools
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
