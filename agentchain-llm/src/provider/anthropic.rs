//! Anthropic Claude provider implementation

use super::sse::SseBuffer;
use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = config.http_client(120)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn base_url(&self) -> String {
        self.config.base_url_or(ANTHROPIC_BASE_URL)
    }

    fn build_request(&self, request: CompletionRequest, stream: bool) -> AnthropicRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());

        // System prompts travel outside the message list
        let mut system: Vec<String> = Vec::new();
        let mut messages = Vec::new();
        for msg in request.messages {
            match msg.role {
                Role::System => system.push(msg.content),
                Role::User | Role::Assistant => messages.push(AnthropicMessage::from(msg)),
            }
        }

        AnthropicRequest {
            model,
            messages,
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stream: Some(stream),
            stop_sequences: request.stop,
        }
    }

    async fn send(&self, operation: &'static str, body: &AnthropicRequest) -> Result<reqwest::Response> {
        let api_key = require_key(&self.config, operation)?;

        let mut req = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .json(body);

        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", ANTHROPIC_VERSION);
        }
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| error::network(operation, e))?;

        check_status(operation, response).await
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        self.config
            .default_model
            .as_deref()
            .unwrap_or("claude-sonnet-4-20250514")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(request, false);
        tracing::debug!(provider = "anthropic", model = %body.model, messages = body.messages.len(), "messages request");

        let response = self.send("anthropic::complete", &body).await?;
        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| error::parse("anthropic::complete", e.to_string()))?;

        let completion = api_response.into_completion();
        tracing::debug!(
            model = %completion.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "messages request finished"
        );
        Ok(completion)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        let body = self.build_request(request, true);
        tracing::debug!(provider = "anthropic", model = %body.model, "streaming messages request");

        let response = self.send("anthropic::stream", &body).await?;

        // Create async stream from SSE response
        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut sse = SseBuffer::new();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for event in sse.push(&bytes) {
                            let etype = event.event.as_deref().unwrap_or_default();
                            if let Some(chunk) = state.on_event(etype, &event.data) {
                                let terminal = !matches!(chunk, StreamChunk::Text(_));
                                yield chunk;
                                if terminal {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

/// Per-stream bookkeeping: usage arrives split over `message_start` and `message_delta`
#[derive(Debug, Default)]
struct StreamState {
    input_tokens: usize,
    output_tokens: usize,
    finish_reason: Option<FinishReason>,
}

impl StreamState {
    fn on_event(&mut self, event_type: &str, data: &str) -> Option<StreamChunk> {
        match event_type {
            "message_start" => {
                if let Ok(start) = serde_json::from_str::<MessageStart>(data) {
                    self.input_tokens = start.message.usage.input_tokens;
                    self.output_tokens = start.message.usage.output_tokens;
                }
                None
            }
            "content_block_delta" => match serde_json::from_str::<ContentBlockDelta>(data) {
                Ok(ContentBlockDelta {
                    delta: DeltaContent::TextDelta { text },
                }) => Some(StreamChunk::Text(text)),
                _ => None,
            },
            "message_delta" => {
                if let Ok(delta) = serde_json::from_str::<MessageDelta>(data) {
                    if let Some(reason) = delta.delta.stop_reason {
                        self.finish_reason = Some(FinishReason::from_raw(Some(&reason)));
                    }
                    if let Some(usage) = delta.usage {
                        self.output_tokens = usage.output_tokens;
                    }
                }
                None
            }
            "message_stop" => Some(StreamChunk::Done {
                finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
                usage: Some(Usage::new(self.input_tokens, self.output_tokens)),
            }),
            "error" => {
                let message = serde_json::from_str::<StreamError>(data)
                    .map(|e| format!("{}: {}", e.error.r#type, e.error.message))
                    .unwrap_or_else(|_| data.to_string());
                Some(StreamChunk::Error(message))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

impl From<ChatMessage> for AnthropicMessage {
    fn from(msg: ChatMessage) -> Self {
        let role = match msg.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };
        Self {
            role: role.into(),
            content: msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

impl AnthropicResponse {
    fn into_completion(self) -> CompletionResponse {
        let content: String = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        CompletionResponse {
            id: self.id,
            model: self.model,
            content: non_empty(content),
            finish_reason: FinishReason::from_raw(self.stop_reason.as_deref()),
            usage: Usage::new(self.usage.input_tokens, self.usage.output_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

// Streaming types
#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: DeltaContent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeltaContent {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<DeltaUsage>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    error: StreamErrorBody,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    r#type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(ProviderConfig::anthropic("sk-ant-test")).unwrap()
    }

    #[test]
    fn test_system_prompt_is_hoisted() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("You are an experienced Product Owner."),
            ChatMessage::user("User Request: a todo app"),
        ]);
        let body = serde_json::to_value(provider().build_request(req, false)).unwrap();

        assert_eq!(body["system"], "You are an experienced Product Owner.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert!(body.get("stop_sequences").is_none());
    }

    #[test]
    fn test_request_without_system() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]).with_max_tokens(256);
        let body = provider().build_request(req, true);
        assert!(body.system.is_none());
        assert_eq!(body.max_tokens, 256);
        assert_eq!(body.stream, Some(true));
    }

    #[test]
    fn test_response_conversion() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                { "type": "text", "text": "## Architecture\n" },
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "- CLI binary" }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 20, "output_tokens": 8 }
        });
        let resp: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = resp.into_completion();

        assert_eq!(completion.content.as_deref(), Some("## Architecture\n- CLI binary"));
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage.total_tokens, 28);
    }

    #[test]
    fn test_empty_response_has_no_content() {
        let raw = serde_json::json!({
            "id": "msg_2", "model": "m", "content": [], "stop_reason": "max_tokens",
            "usage": { "input_tokens": 1, "output_tokens": 0 }
        });
        let resp: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = resp.into_completion();
        assert!(completion.content.is_none());
        assert_eq!(completion.finish_reason, FinishReason::Length);
    }

    #[test]
    fn test_stream_state() {
        let mut state = StreamState::default();
        assert!(state
            .on_event("message_start", r#"{"message":{"usage":{"input_tokens":15,"output_tokens":1}}}"#)
            .is_none());
        assert_eq!(
            state.on_event("content_block_delta", r#"{"index":0,"delta":{"type":"text_delta","text":"Test plan"}}"#),
            Some(StreamChunk::Text("Test plan".into()))
        );
        assert!(state.on_event("ping", "{}").is_none());
        assert!(state
            .on_event("message_delta", r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":9}}"#)
            .is_none());
        assert_eq!(
            state.on_event("message_stop", "{}"),
            Some(StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: Some(Usage::new(15, 9)),
            })
        );
    }

    #[test]
    fn test_stream_error_event() {
        let mut state = StreamState::default();
        let chunk = state.on_event(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert_eq!(chunk, Some(StreamChunk::Error("overloaded_error: Overloaded".into())));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let mut config = ProviderConfig::anthropic("");
        config.api_key = None;
        let p = AnthropicProvider::new(config).unwrap();
        let err = p.prompt("hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(err.context_value("provider"), Some("anthropic"));
    }
}
