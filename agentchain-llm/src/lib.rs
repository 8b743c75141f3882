//! # agentchain-llm
//!
//! The language-model client behind every agent.
//!
//! ## Core Concepts
//! - **LlmProvider**: trait for "generate text from a prompt" (plus chat and streaming)
//! - **Providers**: OpenAI-compatible (OpenAI, Ollama, vLLM, local bridges) and Anthropic
//! - **Provider**: runtime-selected provider, statically dispatched
//! - **UsageTracker**: token accounting across calls

pub mod error;
pub mod provider;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    AnthropicProvider, ChatMessage, CompletionRequest, CompletionResponse, FinishReason,
    LlmProvider, OpenAIProvider, Provider, ProviderConfig, ProviderType, Role, StreamChunk,
    StreamReceiver, Usage, UsageTracker,
};
