//! OpenAI-compatible provider implementation
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::sse::SseBuffer;
use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = config.http_client(120)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn base_url(&self) -> String {
        self.config.base_url_or(OPENAI_BASE_URL)
    }

    fn build_request(&self, request: CompletionRequest, stream: bool) -> OpenAIRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());

        OpenAIRequest {
            model,
            messages: request.messages.into_iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(stream),
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            stop: request.stop,
        }
    }

    async fn send(&self, operation: &'static str, body: &OpenAIRequest) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(body);

        if self.config.provider_type == ProviderType::OpenAI {
            let api_key = require_key(&self.config, operation)?;
            req = req.bearer_auth(api_key);
        } else if let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(api_key);
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

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        self.config.provider_type.as_str()
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4o")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(request, false);
        tracing::debug!(provider = self.name(), model = %body.model, messages = body.messages.len(), "chat completion");

        let response = self.send("openai::complete", &body).await?;
        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| error::parse("openai::complete", e.to_string()))?;

        let completion = api_response.into_completion()?;
        tracing::debug!(
            model = %completion.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "chat completion finished"
        );
        Ok(completion)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        let body = self.build_request(request, true);
        tracing::debug!(provider = self.name(), model = %body.model, "streaming chat completion");

        let response = self.send("openai::stream", &body).await?;

        // Create async stream from SSE response
        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut sse = SseBuffer::new();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for event in sse.push(&bytes) {
                            for chunk in state.on_data(&event.data) {
                                let done = matches!(chunk, StreamChunk::Done { .. });
                                yield chunk;
                                if done {
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

            if let Some(event) = sse.finish() {
                for chunk in state.on_data(&event.data) {
                    let done = matches!(chunk, StreamChunk::Done { .. });
                    yield chunk;
                    if done {
                        return;
                    }
                }
            }
            // Server closed without [DONE]
            yield state.done();
        };

        Ok(StreamReceiver::new(stream))
    }
}

/// Streaming state: the finish reason and the usage chunk arrive before `[DONE]`
#[derive(Debug, Default)]
struct StreamState {
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl StreamState {
    /// Translate one SSE `data:` payload into stream chunks
    fn on_data(&mut self, data: &str) -> Vec<StreamChunk> {
        if data.trim() == "[DONE]" {
            return vec![self.done()];
        }

        let chunk: OpenAIStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::trace!(error = %e, "skipping undecodable stream event");
                return Vec::new();
            }
        };

        if let Some(u) = &chunk.usage {
            self.usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
        }

        let mut out = Vec::new();
        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = choice.delta.content.as_ref().filter(|c| !c.is_empty()) {
                out.push(StreamChunk::Text(content.clone()));
            }
            if let Some(reason) = &choice.finish_reason {
                self.finish_reason = Some(FinishReason::from_raw(Some(reason)));
            }
        }
        out
    }

    fn done(&self) -> StreamChunk {
        StreamChunk::Done {
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            usage: self.usage,
        }
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

/// Asks the server for a final usage chunk (empty `choices`) before `[DONE]`
#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<ChatMessage> for OpenAIMessage {
    fn from(msg: ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().into(),
            content: Some(msg.content),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    fn into_completion(self) -> Result<CompletionResponse> {
        let choice = self.choices.into_iter().next().ok_or_else(|| {
            error::parse("openai::complete", "no choices in response")
        })?;

        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: self.id,
            model: self.model,
            content: choice.message.content.and_then(non_empty),
            finish_reason: FinishReason::from_raw(choice.finish_reason.as_deref()),
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(config: ProviderConfig) -> OpenAIProvider {
        OpenAIProvider::new(config).unwrap()
    }

    #[test]
    fn test_request_uses_default_model() {
        let p = provider(ProviderConfig::openai("sk-test").with_model("gpt-4o-mini"));
        let req = CompletionRequest::new(vec![
            ChatMessage::system("You are a QA engineer."),
            ChatMessage::user("Implementation: fn main() {}"),
        ])
        .with_temperature(0.2);

        let body = serde_json::to_value(p.build_request(req, false)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Implementation: fn main() {}");
        assert_eq!(body["stream"], false);
        assert!(body["temperature"].as_f64().unwrap() > 0.19);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_request_model_override() {
        let p = provider(ProviderConfig::local("http://localhost:11434/v1", "llama3.3"));
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]).with_model("qwen2.5");
        let body = p.build_request(req, true);
        assert_eq!(body.model, "qwen2.5");
        assert_eq!(body.stream, Some(true));
        assert_eq!(p.name(), "local");
        assert_eq!(p.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_response_conversion() {
        let raw = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "message": { "role": "assistant", "content": "As a user I want..." },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 30, "total_tokens": 42 }
        });
        let resp: OpenAIResponse = serde_json::from_value(raw).unwrap();
        let completion = resp.into_completion().unwrap();

        assert_eq!(completion.id, "chatcmpl-1");
        assert_eq!(completion.content.as_deref(), Some("As a user I want..."));
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage.total_tokens, 42);
    }

    #[test]
    fn test_response_without_content() {
        let raw = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null }, "finish_reason": "length" }]
        });
        let resp: OpenAIResponse = serde_json::from_value(raw).unwrap();
        let completion = resp.into_completion().unwrap();
        assert!(completion.content.is_none());
        assert_eq!(completion.finish_reason, FinishReason::Length);
        assert_eq!(completion.usage, Usage::default());
    }

    #[test]
    fn test_response_without_choices() {
        let resp: OpenAIResponse = serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        let err = resp.into_completion().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }

    #[test]
    fn test_stream_text_deltas() {
        let mut state = StreamState::default();
        let chunks = state.on_data(r#"{"choices":[{"delta":{"content":"Snake"},"finish_reason":null}]}"#);
        assert_eq!(chunks, vec![StreamChunk::Text("Snake".into())]);
        assert!(state.on_data("not json").is_empty());
    }

    #[test]
    fn test_stream_usage_arrives_after_finish() {
        let mut state = StreamState::default();
        let events = [
            r#"{"choices":[{"delta":{"content":"ok"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
            "[DONE]",
        ];
        let chunks: Vec<StreamChunk> = events.iter().flat_map(|e| state.on_data(e)).collect();

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("ok".into()),
                StreamChunk::Done {
                    finish_reason: FinishReason::Length,
                    usage: Some(Usage::new(3, 4)),
                },
            ]
        );
    }

    #[test]
    fn test_stream_done_without_usage() {
        let mut state = StreamState::default();
        assert_eq!(
            state.on_data("[DONE]"),
            vec![StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: None,
            }]
        );
    }

    #[test]
    fn test_stream_request_asks_for_usage() {
        let p = provider(ProviderConfig::openai("sk-test"));
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);

        let body = serde_json::to_value(p.build_request(req.clone(), true)).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);

        let body = serde_json::to_value(p.build_request(req, false)).unwrap();
        assert!(body.get("stream_options").is_none());
    }

    #[tokio::test]
    async fn test_openai_requires_key() {
        let mut config = ProviderConfig::openai("");
        config.api_key = None;
        let p = provider(config);
        let err = p.prompt("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(err.operation(), "openai::complete");
    }
}
