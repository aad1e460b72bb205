//! Scripted transport for tests.
//!
//! Replies are served in the order they were queued and every request is
//! recorded, so tests can assert on both what was sent and how many calls
//! were made.

use super::{ByteStream, Transport, TransportError, TransportRequest, TransportResponse};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        /// Body pieces, delivered as separate stream items
        chunks: Vec<Vec<u8>>,
        /// Keep the body open without sending anything after the pieces
        stall: bool,
    },
    /// Never answer at all
    Hang,
    Error(TransportError),
}

impl MockReply {
    /// JSON body with the given status.
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::text(status, &value.to_string())
    }

    /// Plain text body with the given status.
    pub fn text(status: u16, body: &str) -> Self {
        Self::Response {
            status,
            headers: Vec::new(),
            chunks: vec![body.as_bytes().to_vec()],
            stall: false,
        }
    }

    /// Empty body with the given status.
    pub fn status(status: u16) -> Self {
        Self::Response {
            status,
            headers: Vec::new(),
            chunks: Vec::new(),
            stall: false,
        }
    }

    /// 200 response whose body arrives in the given pieces.
    pub fn chunked<S: AsRef<str>>(pieces: &[S]) -> Self {
        Self::Response {
            status: 200,
            headers: vec![("content-type".to_string(), "text/event-stream".to_string())],
            chunks: pieces.iter().map(|p| p.as_ref().as_bytes().to_vec()).collect(),
            stall: false,
        }
    }

    /// Like [`chunked`](Self::chunked), but the body then stays open and
    /// silent.
    pub fn stalled<S: AsRef<str>>(pieces: &[S]) -> Self {
        match Self::chunked(pieces) {
            Self::Response {
                status,
                headers,
                chunks,
                ..
            } => Self::Response {
                status,
                headers,
                chunks,
                stall: true,
            },
            other => other,
        }
    }

    pub fn timeout() -> Self {
        Self::Error(TransportError::Timeout)
    }

    pub fn connect_error(cause: &str) -> Self {
        Self::Error(TransportError::Connect(cause.to_string()))
    }

    /// Add a response header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Self::Response { headers, .. } = &mut self {
            headers.push((name.to_string(), value.to_string()));
        }
        self
    }
}

/// Transport that replays queued [`MockReply`] values.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<TransportRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transport with replies queued in order.
    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let transport = Self::new();
        for reply in replies {
            transport.push(reply);
        }
        transport
    }

    pub fn push(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        lock(&self.requests).push(request.clone());

        let reply = lock(&self.replies).pop_front().ok_or_else(|| {
            TransportError::Other(format!(
                "no scripted reply for {} {}",
                request.method.as_str(),
                request.url
            ))
        })?;

        match reply {
            MockReply::Hang => futures::future::pending().await,
            MockReply::Error(err) => Err(err),
            MockReply::Response {
                status,
                headers,
                chunks,
                stall,
            } => {
                let headers: HashMap<String, String> = headers
                    .into_iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v))
                    .collect();
                let body = futures::stream::iter(chunks.into_iter().map(Ok));
                let body: ByteStream = if stall {
                    Box::pin(body.chain(futures::stream::pending()))
                } else {
                    Box::pin(body)
                };
                Ok(TransportResponse {
                    status,
                    headers,
                    body,
                })
            }
        }
    }
}
