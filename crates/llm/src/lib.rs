//! LLM integration crate for ragent.
//!
//! Provides a provider-agnostic abstraction over chat-style language
//! models. The agent uses it to classify questions, grade evidence and
//! stream the final answer.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Mock**: Closure-driven replies for tests and offline runs
//!
//! # Example
//! ```no_run
//! use ragent_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{
    collect_stream, ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, LlmStream,
    LlmStreamChunk, LlmUsage,
};
pub use factory::create_client;
pub use providers::{MockLlmClient, OllamaClient};
