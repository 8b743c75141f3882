//! In-memory provider that replays canned answers and records every request

use agentchain_llm::{
    CompletionRequest, CompletionResponse, Error, ErrorKind, FinishReason, LlmProvider, Result,
    StreamChunk, StreamReceiver, Usage,
};
use std::collections::VecDeque;
use std::sync::Mutex;

pub(crate) struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fail_on: Option<(usize, ErrorKind)>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    /// A provider whose `call`-th request (0-based) fails with `kind`
    pub fn failing_at(call: usize, kind: ErrorKind) -> Self {
        Self::new(Vec::<String>::new()).fail_on_call(call, kind)
    }

    pub fn fail_on_call(mut self, call: usize, kind: ErrorKind) -> Self {
        self.fail_on = Some((call, kind));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The user message of every request, in call order
    pub fn user_prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }

    fn answer(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        if let Some((fail_call, kind)) = self.fail_on {
            if fail_call == call {
                return Err(Error::new(kind, "scripted failure").with_operation("scripted::complete"));
            }
        }

        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::unexpected("script exhausted").with_operation("scripted::complete"))?;

        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| m.content.split_whitespace().count())
            .sum();
        let usage = Usage::new(prompt_tokens, text.split_whitespace().count());

        Ok(CompletionResponse {
            id: format!("scripted-{}", call),
            model: request.model.unwrap_or_else(|| self.default_model().to_string()),
            content: if text.trim().is_empty() { None } else { Some(text) },
            finish_reason: FinishReason::Stop,
            usage,
        })
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.answer(request)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver> {
        let response = self.answer(request)?;
        let mut chunks: Vec<StreamChunk> = response
            .content
            .unwrap_or_default()
            .split_inclusive(' ')
            .map(|piece| StreamChunk::Text(piece.to_string()))
            .collect();
        chunks.push(StreamChunk::Done {
            finish_reason: response.finish_reason,
            usage: Some(response.usage),
        });
        Ok(StreamReceiver::new(futures_util::stream::iter(chunks)))
    }
}
