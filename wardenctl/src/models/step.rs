//! Pipeline step outcomes

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Named steps of the deploy pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Preflight,
    Dependencies,
    CollectInput,
    DeployWorkload,
    ConfigureEdge,
    Verify,
}

impl StepName {
    pub const ALL: [StepName; 6] = [
        StepName::Preflight,
        StepName::Dependencies,
        StepName::CollectInput,
        StepName::DeployWorkload,
        StepName::ConfigureEdge,
        StepName::Verify,
    ];

    /// Step that runs after this one, `None` for the last step
    pub fn next(self) -> Option<StepName> {
        let index = StepName::ALL.iter().position(|s| *s == self)?;
        StepName::ALL.get(index + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Preflight => "preflight",
            StepName::Dependencies => "dependencies",
            StepName::CollectInput => "collect-input",
            StepName::DeployWorkload => "deploy-workload",
            StepName::ConfigureEdge => "configure-edge",
            StepName::Verify => "verify",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of one pipeline step
#[derive(Debug)]
pub struct StepResult {
    pub step: StepName,
    pub status: StepStatus,
    pub message: String,
    pub cause: Option<DeployError>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(step: StepName, message: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Success, message.into(), None)
    }

    pub fn skipped(step: StepName, message: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Skipped, message.into(), None)
    }

    pub fn failed(step: StepName, cause: DeployError) -> Self {
        Self::new(step, StepStatus::Failed, cause.to_string(), Some(cause))
    }

    fn new(step: StepName, status: StepStatus, message: String, cause: Option<DeployError>) -> Self {
        Self {
            step,
            status,
            message,
            cause,
            finished_at: Utc::now(),
        }
    }

    /// Turn a step body's `Result` into a result for `step`
    pub fn from_outcome(step: StepName, outcome: Result<String, DeployError>) -> Self {
        match outcome {
            Ok(message) => StepResult::success(step, message),
            Err(cause) => StepResult::failed(step, cause),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}
