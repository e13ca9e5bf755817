//! Pre-supplied answers for unattended runs
//!
//! An answers file maps prompt keys to one answer or a list of answers
//! consumed in order:
//!
//! ```json
//! {
//!   "domain": "vault.example.com",
//!   "email": "ops@example.com",
//!   "app_port": "",
//!   "remove_workload": "yes"
//! }
//! ```
//!
//! A key with no answers left reads as a closed stream.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::input::{Prompt, PromptSource};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Answers {
    One(String),
    Many(Vec<String>),
}

/// Answers keyed by prompt key
#[derive(Debug, Default)]
pub struct ScriptedPrompts {
    answers: HashMap<String, VecDeque<String>>,
    asked: Vec<String>,
    rejected: Vec<(String, String)>,
}

impl ScriptedPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for a key
    pub fn answer(mut self, key: &str, value: &str) -> Self {
        self.answers
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self
    }

    /// Queue several answers for a key, consumed in order
    pub fn answers(mut self, key: &str, values: &[&str]) -> Self {
        for value in values {
            self = self.answer(key, value);
        }
        self
    }

    /// Parse an answers document
    pub fn from_json(contents: &str) -> Result<Self, DeployError> {
        let parsed: HashMap<String, Answers> = serde_json::from_str(contents)?;
        let answers = parsed
            .into_iter()
            .map(|(key, value)| {
                let queue = match value {
                    Answers::One(v) => VecDeque::from([v]),
                    Answers::Many(vs) => VecDeque::from(vs),
                };
                (key, queue)
            })
            .collect();
        Ok(Self {
            answers,
            ..Default::default()
        })
    }

    /// Load an answers file
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        let contents = file.read_string().await?;
        Self::from_json(&contents)
    }

    /// Keys asked so far, in order
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Rejected answers as (key, reason)
    pub fn rejected(&self) -> &[(String, String)] {
        &self.rejected
    }
}

#[async_trait]
impl PromptSource for ScriptedPrompts {
    async fn ask(&mut self, prompt: &Prompt) -> Result<Option<String>, DeployError> {
        self.asked.push(prompt.key.clone());
        Ok(self
            .answers
            .get_mut(&prompt.key)
            .and_then(|queue| queue.pop_front()))
    }

    async fn reject(&mut self, prompt: &Prompt, reason: &str) {
        warn!(key = %prompt.key, reason, "Scripted answer rejected");
        self.rejected.push((prompt.key.clone(), reason.to_string()));
    }
}
