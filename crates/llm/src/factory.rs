//! LLM provider factory.
//!
//! Resolves the configured provider name into a client implementation.

use crate::client::LlmClient;
use crate::providers::{MockLlmClient, OllamaClient};
use ragent_core::config::LlmSettings;
use ragent_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client from the application's LLM settings.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(settings: &LlmSettings) -> AppResult<Arc<dyn LlmClient>> {
    match settings.provider.to_lowercase().as_str() {
        "ollama" => {
            let client = match settings.endpoint.as_deref() {
                Some(endpoint) => OllamaClient::with_base_url(endpoint),
                None => OllamaClient::new(),
            };
            Ok(Arc::new(client))
        }
        "mock" => Ok(Arc::new(MockLlmClient::echo())),
        other => Err(AppError::Config(format!("Unknown LLM provider: {}", other))),
    }
}
