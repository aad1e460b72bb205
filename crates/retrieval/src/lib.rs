//! Retrieval service for ragent.
//!
//! Validates and clamps retrieval parameters, calls the backend's retrieval
//! endpoint, normalizes and deduplicates chunks, and renders them as text
//! for the model.

pub mod dedup;
pub mod format;
pub mod service;
pub mod types;

pub use dedup::dedup_chunks;
pub use format::{format_chunks_for_agent, DEFAULT_MAX_CHUNKS, NO_RESULTS_MESSAGE};
pub use service::{ChunkRetriever, RetrievalService, RETRIEVAL_PATH};
pub use types::{DocAggregate, RetrievalChunk, RetrievalOptions, RetrievalResponse};
