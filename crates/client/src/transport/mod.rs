//! HTTP transport port.
//!
//! The protocol client speaks to the network only through [`Transport`].
//! Production code uses [`HttpTransport`] (reqwest); tests script replies
//! with [`MockTransport`].

pub mod http;
pub mod mock;

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport};

/// HTTP methods used by the backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A fully resolved outgoing request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Whole-request timeout. `None` for streams, which may stay open for
    /// as long as the consumer keeps reading; those are bounded per read
    /// with [`with_read_timeout`] instead.
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Failure below the HTTP status level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request or a body read exceeded its timeout
    Timeout,
    /// TCP/TLS connection could not be established
    Connect(String),
    /// Any other I/O failure (reset mid-body, protocol error)
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::Connect(cause) => write!(f, "connect failed: {}", cause),
            TransportError::Other(cause) => write!(f, "{}", cause),
        }
    }
}

/// Response body delivered incrementally.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Fail the body with [`TransportError::Timeout`] when the next piece takes
/// longer than `timeout` to arrive. The stream ends after the timeout.
pub fn with_read_timeout(body: ByteStream, timeout: Duration) -> ByteStream {
    Box::pin(futures::stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(timeout, body.next()).await {
            Ok(Some(item)) => Some((item, Some(body))),
            Ok(None) => None,
            Err(_) => Some((Err(TransportError::Timeout), None)),
        }
    }))
}

/// Status, headers and a lazily read body.
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Read the full body as (lossy) UTF-8.
    pub async fn text(mut self) -> Result<String, TransportError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends one HTTP request. Implementations must not retry.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
