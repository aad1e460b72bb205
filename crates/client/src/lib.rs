//! Protocol client for the retrieval/completion backend.
//!
//! Wraps HTTP with credential selection, bounded 5xx retries, rate-limit
//! classification and lazy decoding of streamed completions.

pub mod client;
pub mod config;
pub mod envelope;
pub mod sleeper;
pub mod stream;
pub mod transport;

pub use client::{BackendClient, DEFAULT_RETRY_AFTER_SECS};
pub use config::{AuthMode, ClientConfig};
pub use envelope::into_data;
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
pub use stream::{CompletionDelta, CompletionEvent, CompletionStream};
pub use transport::{Method, MockReply, MockTransport, Transport};
