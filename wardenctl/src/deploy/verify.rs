//! Post-deploy verification

use std::net::SocketAddr;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info};

use crate::app::options::AppOptions;
use crate::deploy::edge::certificate_present;
use crate::deploy::nginx::NginxControl;
use crate::deploy::workload::probe_ready;
use crate::errors::DeployError;
use crate::models::config::DeploymentConfig;
use crate::models::step::{StepName, StepResult};
use crate::process::CommandRunner;

const ROUTED_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Confirm routing, certificate and workload are all in place
pub async fn verify(
    runner: &dyn CommandRunner,
    options: &AppOptions,
    config: &DeploymentConfig,
) -> StepResult {
    StepResult::from_outcome(StepName::Verify, verify_impl(runner, options, config).await)
}

async fn verify_impl(
    runner: &dyn CommandRunner,
    options: &AppOptions,
    config: &DeploymentConfig,
) -> Result<String, DeployError> {
    let layout = &options.layout;
    let domain = config.domain();

    let link = layout.site_link(domain);
    if fs::symlink_metadata(&link).await.is_err() {
        return Err(DeployError::VerificationError(format!(
            "site for {} is not enabled ({} missing)",
            domain,
            link.display()
        )));
    }
    NginxControl::new(runner, layout, options.command_timeout)
        .check()
        .await?;
    debug!(%domain, "Routing enabled and valid");

    if !certificate_present(layout, domain).await {
        return Err(DeployError::VerificationError(format!(
            "certificate files missing under {}",
            layout.cert_live_dir(domain).path().display()
        )));
    }
    debug!(%domain, "Certificate files present");

    let workload = &options.workload;
    probe_ready(
        config.workload_ports().app,
        workload.readiness_attempts,
        &workload.readiness_backoff,
    )
    .await?;

    let mut checks = vec!["routing", "certificate", "workload"];
    if options.edge.routed_probe {
        routed_probe(config).await?;
        checks.push("routed https");
    }

    info!(%domain, ?checks, "Deployment verified");
    Ok(format!("{} verified: {}", config.public_url(), checks.join(", ")))
}

/// GET `/alive` through the edge with the domain pinned to loopback, so the
/// request exercises nginx, the certificate and the workload together
pub async fn routed_probe(config: &DeploymentConfig) -> Result<(), DeployError> {
    let https_port = config.edge_ports().https;
    let url = format!("{}/alive", config.public_url());
    let client = reqwest::Client::builder()
        .resolve(config.domain(), SocketAddr::from(([127, 0, 0, 1], https_port)))
        .timeout(ROUTED_PROBE_TIMEOUT)
        .build()?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| DeployError::VerificationError(format!("GET {} failed: {}", url, e)))?;
    let status = response.status();
    if status.is_success() {
        debug!(%url, %status, "Routed probe succeeded");
        Ok(())
    } else {
        Err(DeployError::VerificationError(format!(
            "GET {} returned {}",
            url, status
        )))
    }
}
