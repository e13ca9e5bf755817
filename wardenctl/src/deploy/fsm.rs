//! Finite State Machine for the deploy pipeline

use std::fmt;

use crate::models::step::StepName;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Not started
    Pending,

    /// A step is executing
    Running(StepName),

    /// Every step passed
    Succeeded,

    /// A step failed, compensations not yet run
    Failed(StepName),

    /// Compensations ran after a failure in the given step
    RolledBack(StepName),
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Pending => f.write_str("pending"),
            PipelineStatus::Running(step) => write!(f, "running({})", step),
            PipelineStatus::Succeeded => f.write_str("succeeded"),
            PipelineStatus::Failed(step) => write!(f, "failed({})", step),
            PipelineStatus::RolledBack(step) => write!(f, "rolled-back({})", step),
        }
    }
}

/// Pipeline event
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Start the first step
    Begin,

    /// The running step finished successfully
    StepSucceeded,

    /// The running step had nothing to do
    StepSkipped,

    /// The running step failed
    StepFailed(String),

    /// Compensating actions finished
    RollbackDone,
}

/// Pipeline FSM
#[derive(Debug, Clone)]
pub struct PipelineFsm {
    state: PipelineStatus,
    error: Option<String>,
}

impl PipelineFsm {
    pub fn new() -> Self {
        Self {
            state: PipelineStatus::Pending,
            error: None,
        }
    }

    pub fn state(&self) -> PipelineStatus {
        self.state
    }

    /// Error message of the failed step, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PipelineStatus::Succeeded | PipelineStatus::RolledBack(_)
        )
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: PipelineEvent) -> Result<PipelineStatus, String> {
        let new_state = match (&self.state, &event) {
            (PipelineStatus::Pending, PipelineEvent::Begin) => {
                PipelineStatus::Running(StepName::ALL[0])
            }

            (
                PipelineStatus::Running(step),
                PipelineEvent::StepSucceeded | PipelineEvent::StepSkipped,
            ) => match step.next() {
                Some(next) => PipelineStatus::Running(next),
                None => PipelineStatus::Succeeded,
            },
            (PipelineStatus::Running(step), PipelineEvent::StepFailed(err)) => {
                self.error = Some(err.clone());
                PipelineStatus::Failed(*step)
            }

            (PipelineStatus::Failed(step), PipelineEvent::RollbackDone) => {
                PipelineStatus::RolledBack(*step)
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for PipelineFsm {
    fn default() -> Self {
        Self::new()
    }
}
