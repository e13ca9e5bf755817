//! Operator input
//!
//! Prompts go through [`PromptSource`], either an interactive terminal or a
//! pre-supplied answers file for unattended runs.

pub mod collector;
pub mod scripted;
pub mod terminal;
pub mod validate;

use async_trait::async_trait;

use crate::errors::DeployError;

/// A single question put to the operator
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Stable key used by scripted answers
    pub key: String,

    /// Text shown to the operator
    pub question: String,

    /// Value used when the answer is blank
    pub default: Option<String>,
}

impl Prompt {
    pub fn new(key: &str, question: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            question: question.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl ToString) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

#[async_trait]
pub trait PromptSource: Send {
    /// Ask a question. `Ok(None)` means the input stream is closed.
    async fn ask(&mut self, prompt: &Prompt) -> Result<Option<String>, DeployError>;

    /// Surface a rejected answer before the question is asked again
    async fn reject(&mut self, _prompt: &Prompt, _reason: &str) {}

    /// Ask a yes/no question. Anything other than an explicit yes, including a
    /// closed stream, counts as no.
    async fn confirm(&mut self, key: &str, question: &str) -> Result<bool, DeployError> {
        let prompt = Prompt::new(key, format!("{} [y/N]", question));
        Ok(self
            .ask(&prompt)
            .await?
            .map(|answer| is_yes(&answer))
            .unwrap_or(false))
    }
}

/// Whether an answer means yes
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
