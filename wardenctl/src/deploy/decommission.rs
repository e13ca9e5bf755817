//! Reverse pipeline: remove what a deploy created, one confirmed action at
//! a time

use std::fmt;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::compose::ComposeCli;
use crate::deploy::nginx::NginxControl;
use crate::errors::DeployError;
use crate::input::PromptSource;
use crate::process::{CommandRunner, CommandSpec};
use crate::storage::layout::StorageLayout;

/// One destructive decommission action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecommissionAction {
    RemoveWorkload,
    DeleteData,
    RemoveRouting,
    DeleteCertificate,
}

impl DecommissionAction {
    pub const ALL: [DecommissionAction; 4] = [
        DecommissionAction::RemoveWorkload,
        DecommissionAction::DeleteData,
        DecommissionAction::RemoveRouting,
        DecommissionAction::DeleteCertificate,
    ];

    /// Answer key for scripted confirmations
    pub fn key(&self) -> &'static str {
        match self {
            DecommissionAction::RemoveWorkload => "remove_workload",
            DecommissionAction::DeleteData => "delete_data",
            DecommissionAction::RemoveRouting => "remove_routing",
            DecommissionAction::DeleteCertificate => "delete_certificate",
        }
    }

    fn question(&self, domain: &str, layout: &StorageLayout) -> String {
        match self {
            DecommissionAction::RemoveWorkload => {
                "Stop and remove the vault container, its compose definition and admin secret?"
                    .to_string()
            }
            DecommissionAction::DeleteData => format!(
                "PERMANENTLY delete all vault data in {}? This cannot be undone.",
                layout.data_dir().path().display()
            ),
            DecommissionAction::RemoveRouting => format!(
                "Remove the nginx site for {} and restore the default site?",
                domain
            ),
            DecommissionAction::DeleteCertificate => {
                format!("Revoke and delete the TLS certificate for {}?", domain)
            }
        }
    }
}

impl fmt::Display for DecommissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key().replace('_', " "))
    }
}

/// What happened to one action
#[derive(Debug)]
pub enum ActionOutcome {
    Done(String),
    AlreadyRemoved,
    Declined,
    Failed(DeployError),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Done(message) => write!(f, "done: {}", message),
            ActionOutcome::AlreadyRemoved => f.write_str("already removed, skipping"),
            ActionOutcome::Declined => f.write_str("not confirmed, skipping"),
            ActionOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct DecommissionReport {
    pub domain: String,
    pub actions: Vec<(DecommissionAction, ActionOutcome)>,
}

impl DecommissionReport {
    pub fn outcome(&self, action: DecommissionAction) -> Option<&ActionOutcome> {
        self.actions
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, outcome)| outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.actions
            .iter()
            .any(|(_, outcome)| matches!(outcome, ActionOutcome::Failed(_)))
    }
}

/// Run every action in order. Missing targets are not asked about, and a
/// failed action does not stop the ones after it.
pub async fn decommission(
    runner: &dyn CommandRunner,
    options: &AppOptions,
    prompts: &mut dyn PromptSource,
    domain: &str,
) -> DecommissionReport {
    let layout = &options.layout;
    let mut actions = Vec::with_capacity(DecommissionAction::ALL.len());

    for action in DecommissionAction::ALL {
        let outcome = if !target_present(action, layout, domain).await {
            info!(%action, "Already removed, skipping");
            ActionOutcome::AlreadyRemoved
        } else {
            match prompts
                .confirm(action.key(), &action.question(domain, layout))
                .await
            {
                Ok(true) => match perform(action, runner, options, domain).await {
                    Ok(message) => {
                        info!(%action, %message, "Decommission action done");
                        ActionOutcome::Done(message)
                    }
                    Err(e) => {
                        warn!(%action, error = %e, "Decommission action failed");
                        ActionOutcome::Failed(e)
                    }
                },
                Ok(false) | Err(_) => {
                    info!(%action, "Not confirmed, skipping");
                    ActionOutcome::Declined
                }
            }
        };
        actions.push((action, outcome));
    }

    DecommissionReport {
        domain: domain.to_string(),
        actions,
    }
}

async fn target_present(action: DecommissionAction, layout: &StorageLayout, domain: &str) -> bool {
    match action {
        DecommissionAction::RemoveWorkload => {
            layout.compose_file().exists().await || layout.secret_file().exists().await
        }
        DecommissionAction::DeleteData => layout.data_dir().exists().await,
        DecommissionAction::RemoveRouting => {
            layout.site_file(domain).exists().await
                || tokio::fs::symlink_metadata(layout.site_link(domain))
                    .await
                    .is_ok()
        }
        DecommissionAction::DeleteCertificate => {
            layout.cert_live_dir(domain).exists().await
                || layout.cert_archive_dir(domain).exists().await
                || layout.cert_renewal_file(domain).exists().await
        }
    }
}

async fn perform(
    action: DecommissionAction,
    runner: &dyn CommandRunner,
    options: &AppOptions,
    domain: &str,
) -> Result<String, DeployError> {
    let layout = &options.layout;
    match action {
        DecommissionAction::RemoveWorkload => remove_workload(runner, options).await,
        DecommissionAction::DeleteData => {
            layout.data_dir().delete().await?;
            Ok(format!("deleted {}", layout.data_dir().path().display()))
        }
        DecommissionAction::RemoveRouting => {
            NginxControl::new(runner, layout, options.command_timeout)
                .deactivate(domain)
                .await?;
            Ok(format!("site for {} removed, default site enabled", domain))
        }
        DecommissionAction::DeleteCertificate => delete_certificate(runner, options, domain).await,
    }
}

async fn remove_workload(
    runner: &dyn CommandRunner,
    options: &AppOptions,
) -> Result<String, DeployError> {
    let layout = &options.layout;
    let compose_file = layout.compose_file();
    if compose_file.exists().await {
        let compose = ComposeCli::detect(
            runner,
            compose_file.path(),
            &options.workload.project_name,
            options.workload.start_timeout,
        )
        .await?;
        compose.down().await?;
        compose_file.delete().await?;
    }
    layout.secret_file().delete().await?;
    Ok("container stopped, definition and secret deleted".to_string())
}

async fn delete_certificate(
    runner: &dyn CommandRunner,
    options: &AppOptions,
    domain: &str,
) -> Result<String, DeployError> {
    let layout = &options.layout;
    let revoke = CommandSpec::new("certbot")
        .args(["revoke", "--cert-name", domain])
        .args(["--non-interactive", "--delete-after-revoke"])
        .timeout(options.edge.certbot_timeout);

    let mut notes = Vec::new();
    if !succeeded(runner, &revoke).await {
        warn!(%domain, "Revocation failed, deleting certificate without revoking");
        notes.push("not revoked");
        let delete = CommandSpec::new("certbot")
            .args(["delete", "--cert-name", domain, "--non-interactive"])
            .timeout(options.edge.certbot_timeout);
        if !succeeded(runner, &delete).await {
            warn!(%domain, "certbot delete failed, removing files directly");
            notes.push("certbot delete failed");
        }
    }

    let removed = [
        layout.cert_live_dir(domain).delete().await?,
        layout.cert_archive_dir(domain).delete().await?,
        layout.cert_renewal_file(domain).delete().await?,
    ];
    if removed.contains(&true) {
        notes.push("leftover files removed");
    }
    layout.dns_credentials_file().delete().await?;

    if notes.is_empty() {
        Ok(format!("certificate for {} revoked and deleted", domain))
    } else {
        Ok(format!("certificate for {} deleted ({})", domain, notes.join(", ")))
    }
}

async fn succeeded(runner: &dyn CommandRunner, spec: &CommandSpec) -> bool {
    match runner.run(spec).await {
        Ok(output) if output.success() => true,
        Ok(output) => {
            warn!(command = %spec, diagnostic = %output.diagnostic(), "Command failed");
            false
        }
        Err(e) => {
            warn!(command = %spec, error = %e, "Command failed");
            false
        }
    }
}
