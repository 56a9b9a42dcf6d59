//! Interactive prompts.

use async_trait::async_trait;
use dialoguer::{Confirm, Input};

use crate::error::PromptError;

/// Asks the user for values.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Yes/no question.
    async fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError>;

    /// Free-text answer; empty input keeps `default`.
    async fn input(&self, message: &str, default: &str) -> Result<String, PromptError>;
}

/// Terminal prompts via dialoguer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(message)
                .default(default)
                .interact()
                .map_err(PromptError::from)
        })
        .await
        .map_err(|e| PromptError::Terminal(e.to_string()))?
    }

    async fn input(&self, message: &str, default: &str) -> Result<String, PromptError> {
        let message = message.to_string();
        let default = default.to_string();
        tokio::task::spawn_blocking(move || {
            Input::<String>::new()
                .with_prompt(message)
                .default(default)
                .allow_empty(true)
                .interact_text()
                .map_err(PromptError::from)
        })
        .await
        .map_err(|e| PromptError::Terminal(e.to_string()))?
    }
}
