//! Error types for the ragent workspace.
//!
//! A single enum covers the protocol taxonomy (configuration, transport,
//! API rejection, rate limiting, validation) and the ambient failures of
//! the model, prompt and agent layers.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for every ragent crate.
///
/// All fallible functions return `Result<T, AppError>`. Callers branch on
/// the variant: transport and rate-limit errors are theirs to retry,
/// validation and configuration errors never are.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid configuration, raised at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend could not be reached
    #[error("Connection to {base_url} failed: {cause}")]
    Connection { base_url: String, cause: String },

    /// The transport gave up waiting for the backend
    #[error("Timed out after {:.1}s during {operation}", timeout.as_secs_f64())]
    Timeout { timeout: Duration, operation: String },

    /// The backend rejected the request (after client-level retries)
    #[error("API error ({status_code}): {message}")]
    Api {
        status_code: u16,
        error_code: Option<i64>,
        message: String,
        body: Option<String>,
    },

    /// HTTP 429; the caller decides when to resubmit
    #[error("Rate limited by backend, retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    /// Caller misuse or application-level rejection
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Language model invocation errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Unrecoverable orchestration failures
    #[error("Agent error: {0}")]
    Agent(String),

    /// A run was cancelled between iterations
    #[error("Run cancelled")]
    Cancelled,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::Api { status_code, .. } => Some(*status_code),
            AppError::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Seconds the backend asked us to wait before resubmitting.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimit { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Stable lowercase label used in structured logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration",
            AppError::Connection { .. } => "connection",
            AppError::Timeout { .. } => "timeout",
            AppError::Api { .. } => "api",
            AppError::RateLimit { .. } => "rate_limit",
            AppError::Validation(_) => "validation",
            AppError::Io(_) => "io",
            AppError::Llm(_) => "llm",
            AppError::Prompt(_) => "prompt",
            AppError::Agent(_) => "agent",
            AppError::Cancelled => "cancelled",
            AppError::Serialization(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
