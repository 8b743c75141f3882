//! # LLM Provider Interface
//!
//! A trait-based abstraction for communicating with LLM backends.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - Implementations for OpenAI-compatible endpoints and Anthropic
//! - `Provider` picks one of them at runtime from a `ProviderConfig`
//! - Streaming via async iterators
//! - Usage tracking

pub mod anthropic;
pub mod openai;
mod sse;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

use crate::error::{self, Error, ErrorKind, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    /// Generated text; `None` when the model produced nothing
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    /// Map a provider's raw stop reason (`stop`, `end_turn`, `max_tokens`, ...)
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") | Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("length") | Some("max_tokens") => FinishReason::Length,
            Some("content_filter") | Some("refusal") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A streaming chunk from the model
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// Error occurred mid-stream
    Error(String),
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Send a completion request and stream the response
    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str) -> Result<String> {
        self.chat(vec![ChatMessage::user(prompt)]).await
    }

    /// Chat with message history
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = CompletionRequest::new(messages);
        let response = self.complete(request).await?;
        response
            .content
            .ok_or_else(|| Error::empty_response().with_operation("provider::chat"))
    }
}

/// A shared provider is still a provider
impl<P: LlmProvider + ?Sized> LlmProvider for std::sync::Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn default_model(&self) -> &str {
        (**self).default_model()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        (**self).complete(request).await
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        (**self).stream(request).await
    }
}

/// Receiver for streaming responses
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Wait for the next chunk; `None` once the stream is exhausted
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.inner.next().await
    }

    /// Collect all text chunks into a single string
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            match chunk {
                StreamChunk::Text(t) => text.push_str(&t),
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => {
                    return Err(Error::inference_failed(e).with_operation("stream::collect_text"))
                }
            }
        }
        Ok(text)
    }
}

impl fmt::Debug for StreamReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReceiver").finish_non_exhaustive()
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    /// Any OpenAI-compatible server that needs no key (Ollama, vLLM, a local bridge)
    Local,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Local => "local",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            "local" | "ollama" | "bridge" => Ok(ProviderType::Local),
            other => Err(Error::invalid_argument(format!(
                "unknown provider '{}', expected one of: openai, anthropic, local",
                other
            ))
            .with_context("provider", other)),
        }
    }
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: Some(OPENAI_BASE_URL.into()),
            default_model: Some("gpt-4o".into()),
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), "2023-06-01".into());

        Self {
            provider_type: ProviderType::Anthropic,
            api_key: Some(api_key.into()),
            base_url: Some(ANTHROPIC_BASE_URL.into()),
            default_model: Some("claude-sonnet-4-20250514".into()),
            headers,
            timeout_secs: Some(120),
        }
    }

    /// Connect to an OpenAI-compatible server, e.g. Ollama at `http://localhost:11434/v1`
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Local,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    /// Build a config from the provider's conventional environment variables.
    ///
    /// - OpenAI: `OPENAI_API_KEY`, `OPENAI_BASE_URL`
    /// - Anthropic: `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL`
    /// - Local: no variables; Ollama defaults
    pub fn from_env(provider_type: ProviderType) -> Self {
        Self::from_lookup(provider_type, |key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup(provider_type: ProviderType, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (mut config, base_url) = match provider_type {
            ProviderType::OpenAI => (
                Self::openai(var("OPENAI_API_KEY").unwrap_or_default()),
                var("OPENAI_BASE_URL"),
            ),
            ProviderType::Anthropic => (
                Self::anthropic(var("ANTHROPIC_API_KEY").unwrap_or_default()),
                var("ANTHROPIC_BASE_URL"),
            ),
            ProviderType::Local => (Self::local(LOCAL_BASE_URL, "llama3.3"), None),
        };

        if config.api_key.as_deref() == Some("") {
            config.api_key = None;
        }
        if let Some(url) = base_url {
            config.base_url = Some(url);
        }
        config
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Base URL with any trailing slash removed
    pub fn base_url_or(&self, fallback: &'static str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(fallback)
            .trim_end_matches('/')
            .to_string()
    }

    fn http_client(&self, default_timeout: u64) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                self.timeout_secs.unwrap_or(default_timeout),
            ))
            .build()
            .map_err(|e| error::config(format!("failed to create HTTP client: {}", e)).set_source(e))
    }
}

// ============================================================================
// Runtime-selected provider
// ============================================================================

/// A provider chosen at runtime (CLI flag, env var) but dispatched statically
pub enum Provider {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl Provider {
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        match config.provider_type {
            ProviderType::OpenAI | ProviderType::Local => {
                OpenAIProvider::new(config).map(Provider::OpenAI)
            }
            ProviderType::Anthropic => AnthropicProvider::new(config).map(Provider::Anthropic),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            Provider::OpenAI(p) => p.config().provider_type,
            Provider::Anthropic(p) => p.config().provider_type,
        }
    }
}

impl LlmProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.name(),
            Provider::Anthropic(p) => p.name(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.default_model(),
            Provider::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        match self {
            Provider::OpenAI(p) => p.complete(request).await,
            Provider::Anthropic(p) => p.complete(request).await,
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        match self {
            Provider::OpenAI(p) => p.stream(request).await,
            Provider::Anthropic(p) => p.stream(request).await,
        }
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across multiple calls
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageTracker {
    pub total_calls: usize,
    pub total_prompt_tokens: usize,
    pub total_completion_tokens: usize,
    pub by_model: HashMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.total_calls += 1;
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

/// Normalise provider text: blank output counts as no output
pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Turn a non-2xx response into an Error, passing successful ones through
pub(crate) async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    tracing::warn!(operation, status, "provider returned an error status");
    Err(error::http_status(operation, status, body, retry_after))
}

pub(crate) fn require_key<'a>(config: &'a ProviderConfig, operation: &'static str) -> Result<&'a str> {
    config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            Error::new(ErrorKind::AuthenticationFailed, "no API key configured")
                .with_operation(operation)
                .with_context("provider", config.provider_type.as_str())
        })
}

// ============================================================================
// Tests
// ============================================================================
