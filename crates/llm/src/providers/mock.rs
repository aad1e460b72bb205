//! Scripted LLM provider.
//!
//! Replies come from a caller-supplied closure, so tests (and offline runs
//! via `provider: mock`) can drive the agent deterministically. Every
//! request is recorded.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use ragent_core::AppResult;
use std::sync::{Mutex, MutexGuard};

type Responder = dyn Fn(&LlmRequest) -> AppResult<String> + Send + Sync;

/// LLM client whose replies are produced by a closure.
pub struct MockLlmClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> AppResult<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always reply with the same text.
    pub fn fixed(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Reply with the last user message.
    pub fn echo() -> Self {
        Self::new(|request| Ok(request.prompt().to_string()))
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LlmRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn respond(&self, request: &LlmRequest) -> AppResult<String> {
        self.lock().push(request.clone());
        (self.responder)(request)
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = self.respond(request)?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
            done: true,
        })
    }

    /// Streams the reply one word at a time, then an empty final chunk.
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let content = self.respond(request)?;
        let model = request.model.clone();

        let mut chunks: Vec<AppResult<LlmStreamChunk>> = content
            .split_inclusive(' ')
            .map(|word| {
                Ok(LlmStreamChunk {
                    content: word.to_string(),
                    model: model.clone(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        chunks.push(Ok(LlmStreamChunk {
            content: String::new(),
            model,
            done: true,
            usage: Some(LlmUsage::default()),
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
