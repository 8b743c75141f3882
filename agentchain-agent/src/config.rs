//! Orchestrator configuration and the optional JSON config file

use crate::agent::AgentSettings;
use crate::role::AgentRole;
use agentchain_llm::{Error, ProviderType, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// System-prompt overrides, one optional entry per role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptOverrides {
    #[serde(default)]
    pub po: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub dev: Option<String>,
    #[serde(default)]
    pub qa: Option<String>,
}

impl PromptOverrides {
    pub fn get(&self, role: AgentRole) -> Option<&str> {
        match role {
            AgentRole::ProductOwner => self.po.as_deref(),
            AgentRole::Architect => self.arch.as_deref(),
            AgentRole::Developer => self.dev.as_deref(),
            AgentRole::Qa => self.qa.as_deref(),
        }
    }

    /// Entries set in `other` win
    pub fn merge(&mut self, other: PromptOverrides) {
        self.po = other.po.or(self.po.take());
        self.arch = other.arch.or(self.arch.take());
        self.dev = other.dev.or(self.dev.take());
        self.qa = other.qa.or(self.qa.take());
    }
}

/// Runtime configuration for the orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Suppress progress output; results are still returned
    pub quiet: bool,
    /// Print model text as it arrives instead of after each step
    pub stream: bool,
    pub settings: AgentSettings,
    pub prompts: PromptOverrides,
}

/// On-disk configuration, e.g. `agentchain.json`:
///
/// ```json
/// {
///   "provider": "anthropic",
///   "model": "claude-sonnet-4-20250514",
///   "temperature": 0.3,
///   "prompts": { "dev": "You write idiomatic Rust." }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub provider: Option<ProviderType>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub prompts: PromptOverrides,
}

impl ConfigFile {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
        })?;
        Self::parse(&content).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: ConfigFile = serde_json::from_str(content).map_err(|e| {
            Error::config_invalid(format!("failed to parse config: {}", e))
                .with_operation("config::parse")
                .set_source(e)
        })?;

        if let Some(t) = config.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(Error::config_invalid(format!(
                    "temperature must be between 0 and 2, got {}",
                    t
                ))
                .with_operation("config::parse"));
            }
        }
        Ok(config)
    }

    /// Fill in everything the file sets that `config` does not already set
    pub fn apply_to(&self, config: &mut OrchestratorConfig) {
        if let Some(stream) = self.stream {
            config.stream = config.stream || stream;
        }
        let settings = &mut config.settings;
        if settings.model.is_none() {
            settings.model = self.model.clone();
        }
        if settings.temperature.is_none() {
            settings.temperature = self.temperature;
        }
        if settings.max_tokens.is_none() {
            settings.max_tokens = self.max_tokens;
        }

        let mut prompts = self.prompts.clone();
        prompts.merge(std::mem::take(&mut config.prompts));
        config.prompts = prompts;
    }
}
