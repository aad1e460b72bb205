//! Ollama LLM provider implementation.
//!
//! Talks to the chat endpoint of a local Ollama runtime.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{
    ChatMessage, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage,
};
use futures::{Stream, StreamExt};
use ragent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama chat request format.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, PartialEq)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// One chat response object; streaming sends one per line.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaChatResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }

    fn into_chunk(self) -> AppResult<LlmStreamChunk> {
        if let Some(error) = &self.error {
            return Err(AppError::Llm(format!("Ollama stream error: {}", error)));
        }
        let usage = self.done.then(|| self.usage());
        Ok(LlmStreamChunk {
            content: self.message.map(|m| m.content).unwrap_or_default(),
            model: self.model,
            done: self.done,
            usage,
        })
    }
}

/// Ollama LLM client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client against the default local endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn to_ollama_request(&self, request: &LlmRequest, stream: bool) -> OllamaChatRequest {
        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });

        OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            stream,
            options,
        }
    }

    async fn send(&self, body: &OllamaChatRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

type RawBytes = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Split a byte stream into complete NDJSON lines, buffering partial ones.
fn ndjson_chunks(body: RawBytes) -> LlmStream {
    let state = (body, Vec::<u8>::new(), false);

    let stream = futures::stream::unfold(state, |(mut body, mut buffer, mut done)| async move {
        loop {
            if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                return Some((parse_line(&line), (body, buffer, done)));
            }

            if done {
                if buffer.is_empty() {
                    return None;
                }
                let line = String::from_utf8_lossy(&std::mem::take(&mut buffer))
                    .trim()
                    .to_string();
                if line.is_empty() {
                    return None;
                }
                return Some((parse_line(&line), (body, buffer, done)));
            }

            match body.next().await {
                Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    let err = AppError::Llm(format!("Stream error: {}", e));
                    return Some((Err(err), (body, Vec::new(), true)));
                }
                None => done = true,
            }
        }
    });

    Box::pin(stream)
}

fn parse_line(line: &str) -> AppResult<LlmStreamChunk> {
    let response: OllamaChatResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;
    response.into_chunk()
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to Ollama");
        tracing::debug!("Request: {:?}", request);

        let body = self.to_ollama_request(request, false);
        let response = self.send(&body).await?;

        let chat: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = &chat.error {
            return Err(AppError::Llm(format!("Ollama error: {}", error)));
        }

        tracing::info!("Received completion from Ollama");

        let usage = chat.usage();
        Ok(LlmResponse {
            content: chat.message.map(|m| m.content).unwrap_or_default(),
            model: chat.model,
            usage,
            done: chat.done,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::info!("Starting streaming request to Ollama");
        tracing::debug!("Request: {:?}", request);

        let body = self.to_ollama_request(request, true);
        let response = self.send(&body).await?;

        let bytes: RawBytes = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec())),
        );

        Ok(ndjson_chunks(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pieces: &[&str]) -> RawBytes {
        let items: Vec<reqwest::Result<Vec<u8>>> =
            pieces.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        Box::pin(futures::stream::iter(items))
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::with_base_url("http://localhost:11434/");
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_ollama_request_conversion() {
        let client = OllamaClient::new();
        let request = LlmRequest::new("Hello", "llama3")
            .with_system("Be brief")
            .with_temperature(0.7)
            .with_max_tokens(100);

        let ollama_req = client.to_ollama_request(&request, true);
        assert_eq!(ollama_req.model, "llama3");
        assert_eq!(ollama_req.messages.len(), 2);
        assert!(ollama_req.stream);
        assert_eq!(
            ollama_req.options,
            Some(OllamaOptions {
                temperature: Some(0.7),
                num_predict: Some(100),
            })
        );
    }

    #[test]
    fn test_options_omitted_when_unset() {
        let client = OllamaClient::new();
        let ollama_req = client.to_ollama_request(&LlmRequest::new("Hi", "llama3"), false);
        let json = serde_json::to_value(&ollama_req).unwrap();
        assert!(json.get("options").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_ndjson_lines_split_across_chunks() {
        let stream = ndjson_chunks(raw(&[
            "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"model\":\"m\",\"mess",
            "age\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"model\":\"m\",\"done\":true,\"prompt_eval_count\":3,\"eval_count\":2}",
        ]));

        let chunks: Vec<LlmStreamChunk> = futures::TryStreamExt::try_collect(stream).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "Hel");
        assert_eq!(chunks[1].content, "lo");
        assert!(chunks[2].done);
        assert_eq!(chunks[2].usage, Some(LlmUsage::new(3, 2)));
    }

    #[tokio::test]
    async fn test_ndjson_error_field() {
        let mut stream = ndjson_chunks(raw(&["{\"error\":\"model not found\"}\n"]));
        match stream.next().await {
            Some(Err(AppError::Llm(msg))) => assert!(msg.contains("model not found")),
            other => panic!("expected llm error, got {:?}", other),
        }
    }
}
