//! Chat session management for ragent.
//!
//! Thin translation of session CRUD onto the backend API, plus per-process
//! bookkeeping of which sessions are open and when they were last used.

pub mod manager;
pub mod types;

pub use manager::{SessionManager, DEFAULT_IDLE_TIMEOUT, MAX_CLOSED_IDS};
pub use types::{ChatSession, ListQuery, SessionAnswer, SessionRecord};
