//! Interactive terminal prompts

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::errors::DeployError;
use crate::input::{Prompt, PromptSource};

/// Reads answers line by line from stdin
pub struct TerminalPrompt {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptSource for TerminalPrompt {
    async fn ask(&mut self, prompt: &Prompt) -> Result<Option<String>, DeployError> {
        let text = match &prompt.default {
            Some(default) => format!("{} [{}]: ", prompt.question, default),
            None => format!("{}: ", prompt.question),
        };
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;

        Ok(self.lines.next_line().await?)
    }

    async fn reject(&mut self, _prompt: &Prompt, reason: &str) {
        eprintln!("{} {}", "invalid:".yellow().bold(), reason);
    }
}
