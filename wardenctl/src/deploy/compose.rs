//! Docker Compose lifecycle for the workload

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// Which compose entry point the host provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose` (v2 plugin)
    Plugin,
    /// standalone `docker-compose` binary
    Standalone,
}

/// Runs compose commands against one definition file and project
pub struct ComposeCli<'a> {
    runner: &'a dyn CommandRunner,
    flavor: ComposeFlavor,
    file: PathBuf,
    project: String,
    timeout: Duration,
}

impl<'a> ComposeCli<'a> {
    /// Detect the compose flavor, preferring the plugin
    pub async fn detect(
        runner: &'a dyn CommandRunner,
        file: &Path,
        project: &str,
        timeout: Duration,
    ) -> Result<Self, DeployError> {
        let flavor = if probe(runner, CommandSpec::new("docker").args(["compose", "version"])).await {
            ComposeFlavor::Plugin
        } else if probe(runner, CommandSpec::new("docker-compose").arg("version")).await {
            warn!("docker compose plugin unavailable, using docker-compose");
            ComposeFlavor::Standalone
        } else {
            return Err(DeployError::WorkloadStartError(
                "neither `docker compose` nor `docker-compose` is available".to_string(),
            ));
        };
        debug!(?flavor, "Compose flavor detected");

        Ok(Self {
            runner,
            flavor,
            file: file.to_path_buf(),
            project: project.to_string(),
            timeout,
        })
    }

    /// Build a compose command for `args`
    pub fn command(&self, args: &[&str]) -> CommandSpec {
        let spec = match self.flavor {
            ComposeFlavor::Plugin => CommandSpec::new("docker").arg("compose"),
            ComposeFlavor::Standalone => CommandSpec::new("docker-compose"),
        };
        spec.arg("-f")
            .arg(self.file.display().to_string())
            .arg("-p")
            .arg(self.project.clone())
            .args(args.iter().copied())
            .timeout(self.timeout)
    }

    /// Pull the images named in the definition
    pub async fn pull(&self) -> Result<(), DeployError> {
        info!(project = %self.project, "Pulling workload image");
        let output = self.run(&["pull"]).await?;
        check(output, DeployError::WorkloadStartError)
    }

    /// Create or recreate the workload in the background
    pub async fn up(&self) -> Result<(), DeployError> {
        info!(project = %self.project, "Starting workload");
        let output = self.run(&["up", "-d", "--force-recreate"]).await?;
        check(output, DeployError::WorkloadStartError)
    }

    /// Stop and remove the workload's containers and network
    pub async fn down(&self) -> Result<(), DeployError> {
        info!(project = %self.project, "Stopping workload");
        let spec = self.command(&["down", "--remove-orphans"]);
        let output = self.runner.run(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::CommandError {
                command: spec.to_string(),
                reason: output.diagnostic(),
            })
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, DeployError> {
        let spec = self.command(args);
        self.runner.run(&spec).await.map_err(|e| match e {
            DeployError::CommandError { command, reason } => {
                DeployError::WorkloadStartError(format!("{}: {}", command, reason))
            }
            other => other,
        })
    }
}

async fn probe(runner: &dyn CommandRunner, spec: CommandSpec) -> bool {
    matches!(runner.run(&spec).await, Ok(output) if output.success())
}

fn check(output: CommandOutput, err: fn(String) -> DeployError) -> Result<(), DeployError> {
    if output.success() {
        Ok(())
    } else {
        Err(err(output.diagnostic()))
    }
}
