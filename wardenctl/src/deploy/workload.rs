//! Workload deployment: secret, compose definition, start, readiness

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::app::options::WorkloadOptions;
use crate::deploy::compose::ComposeCli;
use crate::errors::DeployError;
use crate::models::config::DeploymentConfig;
use crate::models::step::{StepName, StepResult};
use crate::process::CommandRunner;
use crate::render::compose::ComposeDefinition;
use crate::storage::layout::StorageLayout;
use crate::storage::secret::{ManagedSecret, SecretStore};
use crate::utils::{calc_exp_backoff, fingerprint, CooldownOptions};

/// Upper bound on a single readiness connect attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Deploy or redeploy the workload. The returned secret is `existing` when
/// one was supplied and a fresh one otherwise, whatever the step outcome.
pub async fn deploy_workload(
    runner: &dyn CommandRunner,
    layout: &StorageLayout,
    options: &WorkloadOptions,
    config: &DeploymentConfig,
    existing: Option<ManagedSecret>,
) -> (ManagedSecret, StepResult) {
    let secret = match existing {
        Some(secret) => {
            info!(fingerprint = %secret.fingerprint(), "Reusing existing admin secret");
            secret
        }
        None => {
            let secret = ManagedSecret::generate();
            info!(fingerprint = %secret.fingerprint(), "Generated new admin secret");
            secret
        }
    };

    let outcome = deploy_workload_impl(runner, layout, options, config, &secret).await;
    (secret, StepResult::from_outcome(StepName::DeployWorkload, outcome))
}

async fn deploy_workload_impl(
    runner: &dyn CommandRunner,
    layout: &StorageLayout,
    options: &WorkloadOptions,
    config: &DeploymentConfig,
    secret: &ManagedSecret,
) -> Result<String, DeployError> {
    layout.data_dir().create().await?;
    SecretStore::new(layout.secret_file()).save(secret).await?;

    let compose_file = layout.compose_file();
    let rendered = ComposeDefinition::for_workload(config, options, layout).render()?;
    compose_file.write_atomic(rendered.as_bytes()).await?;
    info!(
        path = %compose_file.path().display(),
        digest = %fingerprint(rendered.as_bytes()),
        "Compose definition written"
    );

    let compose = ComposeCli::detect(
        runner,
        compose_file.path(),
        &options.project_name,
        options.start_timeout,
    )
    .await?;
    compose.pull().await?;
    compose.up().await?;

    debug!(settle = ?options.settle_time, "Waiting for workload to settle");
    tokio::time::sleep(options.settle_time).await;

    let port = config.workload_ports().app;
    probe_ready(port, options.readiness_attempts, &options.readiness_backoff).await?;

    Ok(format!(
        "{} running, ready on 127.0.0.1:{}",
        options.image_reference(),
        port
    ))
}

/// Probe `127.0.0.1:port` with TCP connects until one succeeds or the
/// attempt budget runs out
pub async fn probe_ready(
    port: u16,
    attempts: u32,
    backoff: &CooldownOptions,
) -> Result<(), DeployError> {
    let attempts = attempts.max(1);
    for attempt in 0..attempts {
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await {
            Ok(Ok(_)) => {
                debug!(port, attempt = attempt + 1, "Workload accepted connection");
                return Ok(());
            }
            Ok(Err(e)) => debug!(port, attempt = attempt + 1, error = %e, "Workload not ready"),
            Err(_) => debug!(port, attempt = attempt + 1, "Readiness connect timed out"),
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(calc_exp_backoff(backoff, attempt)).await;
        }
    }
    warn!(port, attempts, "Workload never became ready");
    Err(DeployError::ReadinessTimeoutError { port, attempts })
}
