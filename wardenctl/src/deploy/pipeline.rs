//! Deployment orchestrator
//!
//! Runs the deploy steps in order through [`PipelineFsm`]. Steps report a
//! [`StepResult`]; this module alone decides that a failed result halts the
//! run, runs the compensations and builds the [`FailureReport`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::deploy::decommission::{decommission, DecommissionReport};
use crate::deploy::edge::configure_edge;
use crate::deploy::fsm::{PipelineEvent, PipelineFsm, PipelineStatus};
use crate::deploy::nginx::NginxControl;
use crate::deploy::preflight::{require_elevated, run_preflight};
use crate::deploy::verify::verify;
use crate::deploy::workload::deploy_workload;
use crate::errors::DeployError;
use crate::host::HostFacts;
use crate::input::collector::{ask_until_valid, collect_config};
use crate::input::validate::validate_domain;
use crate::input::{Prompt, PromptSource};
use crate::installer::install::ensure_dependencies;
use crate::models::config::DeploymentConfig;
use crate::models::step::{StepName, StepResult, StepStatus};
use crate::process::CommandRunner;
use crate::storage::secret::{ManagedSecret, SecretStore};

/// Progress of one deploy run
#[derive(Debug, Default)]
pub struct PipelineState {
    pub fsm: PipelineFsm,
    pub results: Vec<StepResult>,
    pub rolled_back: bool,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step currently running, if any
    pub fn current_step(&self) -> Option<StepName> {
        match self.fsm.state() {
            PipelineStatus::Running(step) => Some(step),
            _ => None,
        }
    }

    /// Position of the current step in the pipeline
    pub fn step_index(&self) -> Option<usize> {
        let step = self.current_step()?;
        StepName::ALL.iter().position(|s| *s == step)
    }

    fn record(&mut self, result: StepResult) -> Result<(), DeployError> {
        let event = match result.status {
            StepStatus::Success => PipelineEvent::StepSucceeded,
            StepStatus::Skipped => PipelineEvent::StepSkipped,
            StepStatus::Failed => PipelineEvent::StepFailed(result.message.clone()),
        };
        self.results.push(result);
        self.fsm.process(event).map_err(DeployError::Internal)?;
        Ok(())
    }
}

/// Outcome of a successful deploy
#[derive(Debug)]
pub struct DeploySummary {
    pub results: Vec<StepResult>,
    pub public_url: String,
    pub secret_file: PathBuf,
    pub secret_fingerprint: String,
}

/// The single aggregated report for a failed deploy
#[derive(Debug)]
pub struct FailureReport {
    pub step: StepName,
    pub kind: &'static str,
    pub diagnostic: String,
    pub compensations: Vec<String>,
    pub results: Vec<StepResult>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed ({}): {}", self.step, self.kind, self.diagnostic)?;
        for note in &self.compensations {
            write!(f, "\n  compensation: {}", note)?;
        }
        Ok(())
    }
}

/// Drives deploy and decommission runs against a host
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostFacts>,
    options: AppOptions,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, host: Arc<dyn HostFacts>, options: AppOptions) -> Self {
        Self {
            runner,
            host,
            options,
        }
    }

    /// Run the full deploy pipeline
    pub async fn deploy(
        &self,
        prompts: &mut dyn PromptSource,
    ) -> Result<DeploySummary, FailureReport> {
        let mut state = PipelineState::new();
        if let Err(e) = state.fsm.process(PipelineEvent::Begin) {
            return Err(self.internal_failure(StepName::Preflight, e, state));
        }

        let mut config: Option<DeploymentConfig> = None;
        let mut secret: Option<ManagedSecret> = None;

        while let Some(step) = state.current_step() {
            info!(step = %step, index = ?state.step_index(), "Running step");
            let result = self.run_step(step, prompts, &mut config, &mut secret).await;
            match result.status {
                StepStatus::Failed => error!(step = %step, message = %result.message, "Step failed"),
                StepStatus::Skipped => info!(step = %step, message = %result.message, "Step skipped"),
                StepStatus::Success => info!(step = %step, message = %result.message, "Step succeeded"),
            }
            if let Err(e) = state.record(result) {
                return Err(self.internal_failure(step, e.to_string(), state));
            }
        }

        match state.fsm.state() {
            PipelineStatus::Succeeded => {
                let (Some(config), Some(secret)) = (config, secret) else {
                    return Err(self.internal_failure(
                        StepName::Verify,
                        "pipeline finished without config or secret".to_string(),
                        state,
                    ));
                };
                info!(url = %config.public_url(), "Deployment complete");
                Ok(DeploySummary {
                    results: state.results,
                    public_url: config.public_url(),
                    secret_file: self.options.layout.secret_file().path().to_path_buf(),
                    secret_fingerprint: secret.fingerprint(),
                })
            }
            PipelineStatus::Failed(step) => Err(self.roll_back(step, state).await),
            other => Err(self.internal_failure(
                StepName::Preflight,
                format!("pipeline stopped in state {}", other),
                state,
            )),
        }
    }

    async fn run_step(
        &self,
        step: StepName,
        prompts: &mut dyn PromptSource,
        config: &mut Option<DeploymentConfig>,
        secret: &mut Option<ManagedSecret>,
    ) -> StepResult {
        let options = &self.options;
        match step {
            StepName::Preflight => {
                run_preflight(
                    self.host.as_ref(),
                    &options.preflight.required_ports,
                    &options.default_ports.all(),
                    &options.preflight.managed_port_owners,
                    options.preflight.time_sync_grace,
                )
                .await
            }
            StepName::Dependencies => {
                ensure_dependencies(self.runner.as_ref(), &options.tools, options.command_timeout)
                    .await
            }
            StepName::CollectInput => {
                match collect_config(
                    prompts,
                    self.host.as_ref(),
                    options.default_ports,
                    &options.preflight.managed_port_owners,
                )
                .await
                {
                    Ok(collected) => {
                        let message = format!(
                            "{} ({:?} issuance)",
                            collected.public_url(),
                            collected.cert_strategy()
                        );
                        *config = Some(collected);
                        StepResult::success(step, message)
                    }
                    Err(e) => StepResult::failed(step, e),
                }
            }
            StepName::DeployWorkload => {
                let Some(config) = config.as_ref() else {
                    return missing_config(step);
                };
                let existing = match secret.take() {
                    Some(s) => Some(s),
                    None => match SecretStore::new(options.layout.secret_file()).load().await {
                        Ok(loaded) => loaded,
                        Err(e) => return StepResult::failed(step, e),
                    },
                };
                let (kept, result) = deploy_workload(
                    self.runner.as_ref(),
                    &options.layout,
                    &options.workload,
                    config,
                    existing,
                )
                .await;
                *secret = Some(kept);
                result
            }
            StepName::ConfigureEdge => {
                let Some(config) = config.as_ref() else {
                    return missing_config(step);
                };
                configure_edge(self.runner.clone(), options, config).await
            }
            StepName::Verify => {
                let Some(config) = config.as_ref() else {
                    return missing_config(step);
                };
                verify(self.runner.as_ref(), options, config).await
            }
        }
    }

    /// Best-effort compensations after `step` failed. Completed steps are
    /// left in place.
    async fn roll_back(&self, step: StepName, mut state: PipelineState) -> FailureReport {
        let mut compensations = Vec::new();
        if step != StepName::Preflight {
            let nginx = NginxControl::new(
                self.runner.as_ref(),
                &self.options.layout,
                self.options.command_timeout,
            );
            if nginx.is_active().await {
                compensations.push("nginx is running".to_string());
            } else {
                match nginx.start().await {
                    Ok(()) => compensations.push("nginx was stopped, started it".to_string()),
                    Err(e) => {
                        warn!(error = %e, "Could not start nginx");
                        compensations.push(format!("nginx is stopped and could not be started: {}", e))
                    }
                }
            }
        }

        if let Err(e) = state.fsm.process(PipelineEvent::RollbackDone) {
            warn!(error = %e, "Rollback transition rejected");
        }
        state.rolled_back = true;

        let (kind, diagnostic) = state
            .results
            .iter()
            .rev()
            .find(|r| r.is_failed())
            .map(|r| {
                let kind = r.cause.as_ref().map(|c| c.kind()).unwrap_or("Internal");
                (kind, r.message.clone())
            })
            .unwrap_or(("Internal", state.fsm.error().unwrap_or_default().to_string()));

        FailureReport {
            step,
            kind,
            diagnostic,
            compensations,
            results: state.results,
        }
    }

    fn internal_failure(&self, step: StepName, message: String, state: PipelineState) -> FailureReport {
        error!(step = %step, %message, "Pipeline error");
        FailureReport {
            step,
            kind: "Internal",
            diagnostic: message,
            compensations: Vec::new(),
            results: state.results,
        }
    }

    /// Run the decommission actions for a domain, asking for it when not
    /// given. Only a missing privilege or an unusable domain is an error.
    pub async fn decommission(
        &self,
        prompts: &mut dyn PromptSource,
        domain: Option<&str>,
    ) -> Result<DecommissionReport, DeployError> {
        require_elevated(self.host.as_ref())?;

        let domain = match domain {
            Some(raw) => validate_domain(raw).map_err(DeployError::ValidationError)?,
            None => {
                ask_until_valid(
                    prompts,
                    &Prompt::new("domain", "Domain of the deployment to remove"),
                    validate_domain,
                )
                .await?
            }
        };
        info!(%domain, "Decommissioning");
        Ok(decommission(self.runner.as_ref(), &self.options, prompts, &domain).await)
    }
}

fn missing_config(step: StepName) -> StepResult {
    StepResult::failed(
        step,
        DeployError::Internal("deployment parameters were not collected".to_string()),
    )
}
