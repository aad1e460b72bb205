//! Streaming decode of `data:`-prefixed completion frames.
//!
//! The backend streams newline-delimited lines of the form
//! `data:{"code":0,"data":{...}}` and terminates with a sentinel frame
//! whose `data` field is the boolean `true`. Decoding is lazy: bytes are
//! pulled from the connection only as the consumer polls, and the stream
//! ends right after the sentinel (or the first error), which releases the
//! connection when the stream is dropped.

use futures::{Stream, StreamExt};
use ragent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// Prefix carried by every meaningful line.
pub const FRAME_PREFIX: &str = "data:";

/// Body bytes with transport failures already translated.
pub type AppByteStream = Pin<Box<dyn Stream<Item = AppResult<Vec<u8>>> + Send>>;

/// Raw JSON payloads, one per frame, sentinel included.
pub type FrameStream = Pin<Box<dyn Stream<Item = AppResult<Value>> + Send>>;

/// Typed completion events.
pub type CompletionStream = Pin<Box<dyn Stream<Item = AppResult<CompletionEvent>> + Send>>;

/// One incremental piece of a streamed answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionDelta {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub reference: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
}

/// A decoded frame of a completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    Partial(CompletionDelta),
    /// Terminal sentinel; nothing follows it
    Final,
}

impl CompletionEvent {
    /// Convert one frame payload into an event.
    ///
    /// A non-zero application `code` becomes a validation error carrying
    /// the backend message.
    pub fn from_payload(payload: Value) -> AppResult<Self> {
        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("completion failed");
            return Err(AppError::Validation(format!("{} (code {})", message, code)));
        }

        match payload.get("data") {
            Some(Value::Bool(true)) => Ok(CompletionEvent::Final),
            Some(data @ Value::Object(_)) => {
                let delta: CompletionDelta = serde_json::from_value(data.clone())?;
                Ok(CompletionEvent::Partial(delta))
            }
            other => Err(AppError::Serialization(format!(
                "Unexpected completion frame data: {}",
                other.map(Value::to_string).unwrap_or_else(|| "missing".to_string())
            ))),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, CompletionEvent::Final)
    }
}

/// Whether a payload is the terminal sentinel.
pub fn is_sentinel(payload: &Value) -> bool {
    matches!(payload.get("data"), Some(Value::Bool(true)))
}

/// Parse one line. Blank lines and lines without the prefix yield `None`.
pub fn parse_frame_line(line: &str) -> AppResult<Option<Value>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
        tracing::debug!("Skipping unprefixed stream line: {}", line);
        return Ok(None);
    };

    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| AppError::Serialization(format!("Invalid stream frame: {}", e)))
}

struct FrameDecoder {
    body: AppByteStream,
    buffer: Vec<u8>,
    body_done: bool,
    finished: bool,
}

impl FrameDecoder {
    /// Next complete line; the unterminated tail once the body is done.
    fn next_line(&mut self) -> Option<String> {
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            return Some(
                String::from_utf8_lossy(&line)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string(),
            );
        }

        if self.body_done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            return Some(String::from_utf8_lossy(&rest).into_owned());
        }

        None
    }

    async fn next_frame(&mut self) -> Option<AppResult<Value>> {
        loop {
            if self.finished {
                return None;
            }

            while let Some(line) = self.next_line() {
                match parse_frame_line(&line) {
                    Ok(None) => continue,
                    Ok(Some(frame)) => {
                        if is_sentinel(&frame) {
                            self.finished = true;
                        }
                        return Some(Ok(frame));
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            if self.body_done {
                self.finished = true;
                return None;
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => self.body_done = true,
            }
        }
    }
}

/// Decode a byte stream into raw frame payloads.
pub fn decode_frames(body: AppByteStream) -> FrameStream {
    let decoder = FrameDecoder {
        body,
        buffer: Vec::new(),
        body_done: false,
        finished: false,
    };

    Box::pin(futures::stream::unfold(decoder, |mut decoder| async move {
        decoder.next_frame().await.map(|item| (item, decoder))
    }))
}

/// Decode a byte stream into typed completion events.
///
/// Ends after [`CompletionEvent::Final`] or the first error.
pub fn decode_completion_stream(body: AppByteStream) -> CompletionStream {
    let events = decode_frames(body)
        .map(|frame| frame.and_then(CompletionEvent::from_payload))
        .scan(false, |failed, event| {
            if *failed {
                return futures::future::ready(None);
            }
            *failed = event.is_err();
            futures::future::ready(Some(event))
        });

    Box::pin(events)
}
