//! Shared setup for the cookbook binaries.

use std::sync::Arc;

use agno_cookbook::{init_logging, AppConfig, OpenAIClient, Result};
use clap::Parser;

/// Command line shared by the prompt-driven scripts.
#[derive(Debug, Parser)]
#[command(about = "Run an AGNO cookbook agent")]
pub struct PromptArgs {
    /// Prompt to send; words are joined with spaces.
    pub prompt: Vec<String>,
}

impl PromptArgs {
    pub fn prompt_or(&self, fallback: &str) -> String {
        if self.prompt.is_empty() {
            fallback.to_string()
        } else {
            self.prompt.join(" ")
        }
    }
}

/// Loads configuration from the environment, installs logging and builds the model client.
pub fn setup() -> Result<(AppConfig, Arc<OpenAIClient>)> {
    let config = AppConfig::from_env()?;
    init_logging(&config.logging)?;
    let model = OpenAIClient::from_config(&config.model)?;
    tracing::debug!(
        provider = %config.model.provider,
        runtime_env = %config.runtime_env,
        "cookbook configured"
    );
    Ok((config, Arc::new(model)))
}

/// Prompt taken from the command line, or `fallback` when none was given.
pub fn prompt_or(fallback: &str) -> String {
    PromptArgs::parse().prompt_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_prompt_words() {
        let args = PromptArgs::try_parse_from(["basic_agent", "Write", "a", "haiku"]).unwrap();
        assert_eq!(args.prompt_or("fallback"), "Write a haiku");
    }

    #[test]
    fn falls_back_without_prompt() {
        let args = PromptArgs::try_parse_from(["basic_agent"]).unwrap();
        assert_eq!(args.prompt_or("Tell me a story."), "Tell me a story.");
    }
}
