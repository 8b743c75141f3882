//! Agent implementation - a role-specific prompt around one LLM call

use crate::role::AgentRole;
use agentchain_llm::{
    ChatMessage, CompletionRequest, Error, LlmProvider, Result, StreamChunk, Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sampling settings shared by every agent in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model override; the provider's default when unset
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

/// Text produced by one agent call plus accounting
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub text: String,
    pub model: String,
    pub usage: Usage,
}

/// An agent: role + system prompt + shared client
pub struct Agent<P> {
    role: AgentRole,
    provider: Arc<P>,
    system_prompt: String,
    settings: AgentSettings,
}

impl<P: LlmProvider> Agent<P> {
    /// Create an agent with the role's built-in prompt
    pub fn new(role: AgentRole, provider: Arc<P>) -> Self {
        Self {
            role,
            provider,
            system_prompt: role.system_prompt().to_string(),
            settings: AgentSettings::default(),
        }
    }

    /// Replace the built-in system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Produce text from input text
    pub async fn process(&self, input: &str) -> Result<String> {
        self.run(input).await.map(|output| output.text)
    }

    /// Like `process`, keeping the model name and token usage
    pub async fn run(&self, input: &str) -> Result<AgentOutput> {
        tracing::debug!(agent = self.role.key(), input_chars = input.len(), "agent request");

        let response = self
            .provider
            .complete(self.request(input))
            .await
            .map_err(|e| self.annotate(e))?;

        let text = response
            .content
            .ok_or_else(|| self.annotate(Error::empty_response()))?;

        Ok(AgentOutput {
            text,
            model: self.model_name(&response.model),
            usage: response.usage,
        })
    }

    /// Stream the answer, handing every text delta to `on_chunk` as it arrives
    pub async fn process_streaming<F>(&self, input: &str, mut on_chunk: F) -> Result<AgentOutput>
    where
        F: FnMut(&str) -> Result<()>,
    {
        tracing::debug!(agent = self.role.key(), input_chars = input.len(), "agent stream request");

        let mut receiver = self
            .provider
            .stream(self.request(input))
            .await
            .map_err(|e| self.annotate(e))?;

        let mut text = String::new();
        let mut usage = Usage::default();
        while let Some(chunk) = receiver.next().await {
            match chunk {
                StreamChunk::Text(delta) => {
                    on_chunk(&delta)?;
                    text.push_str(&delta);
                }
                StreamChunk::Done { usage: u, .. } => {
                    usage = u.unwrap_or_default();
                    break;
                }
                StreamChunk::Error(e) => {
                    return Err(self.annotate(Error::inference_failed(e)));
                }
            }
        }

        if text.trim().is_empty() {
            return Err(self.annotate(Error::empty_response()));
        }

        Ok(AgentOutput {
            text,
            model: self.model_name(""),
            usage,
        })
    }

    fn request(&self, input: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(input),
        ]);
        if let Some(model) = &self.settings.model {
            request = request.with_model(model);
        }
        if let Some(temperature) = self.settings.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Model reported by the provider, else the one we asked for
    fn model_name(&self, reported: &str) -> String {
        if !reported.is_empty() {
            return reported.to_string();
        }
        self.settings
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    fn annotate(&self, err: Error) -> Error {
        err.with_operation("agent::process")
            .with_context("agent", self.role.key())
    }
}
