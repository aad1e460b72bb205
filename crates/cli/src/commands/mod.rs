//! Command handlers for the ragent CLI.

pub mod ask;
pub mod chat;
pub mod retrieve;
pub mod session;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use retrieve::RetrieveCommand;
pub use session::SessionCommand;

use ragent_client::{BackendClient, ClientConfig};
use ragent_core::{config::AppConfig, AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;

/// Backend client from the configured connection settings.
pub(crate) fn backend_client(config: &AppConfig) -> AppResult<Arc<BackendClient>> {
    let client_config = ClientConfig::from_backend(&config.backend)?;
    tracing::debug!("Backend: {}", client_config.base_url());
    Ok(Arc::new(BackendClient::new(client_config)?))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Flush stdout after a partial line.
pub(crate) fn flush_stdout() {
    use std::io::Write;
    std::io::stdout().flush().ok();
}
