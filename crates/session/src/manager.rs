//! Session manager: remote session CRUD plus local activity bookkeeping.

use crate::types::{ChatSession, ListQuery, SessionAnswer, SessionRecord};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use ragent_client::{into_data, AuthMode, BackendClient, CompletionEvent, CompletionStream};
use ragent_core::config::AnswerFrames;
use ragent_core::{AppError, AppResult};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Idle time after which [`SessionManager::cleanup_inactive`] closes a session.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_SESSION_NAME: &str = "New session";

/// Closed ids remembered so listings can hide them; older ones are
/// forgotten first.
pub const MAX_CLOSED_IDS: usize = 256;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn sessions_path(chat_id: &str) -> String {
    format!("/api/v1/chats/{}/sessions", chat_id)
}

fn completions_path(chat_id: &str) -> String {
    format!("/api/v1/chats/{}/completions", chat_id)
}

/// Records of open sessions plus the ids closed most recently.
///
/// An id is never both open and closed.
#[derive(Debug, Default)]
struct Ledger {
    open: HashMap<String, SessionRecord>,
    /// Oldest first
    closed: VecDeque<String>,
}

impl Ledger {
    /// Drop an open record, remembering the id as closed. False when the id
    /// was not open.
    fn close(&mut self, session_id: &str) -> bool {
        if self.open.remove(session_id).is_none() {
            return false;
        }
        if self.closed.len() >= MAX_CLOSED_IDS {
            self.closed.pop_front();
        }
        self.closed.push_back(session_id.to_string());
        true
    }

    fn is_closed(&self, session_id: &str) -> bool {
        self.closed.iter().any(|id| id == session_id)
    }

    fn forget(&mut self, session_id: &str) {
        self.open.remove(session_id);
        self.closed.retain(|id| id != session_id);
    }
}

fn require(name: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", name)));
    }
    Ok(())
}

/// Creates, lists, renames and deletes chat sessions, and tracks which ones
/// are still in use.
///
/// Local records live only in this process. Closing a session drops its
/// record; the remote session survives unless deletion is requested.
pub struct SessionManager {
    client: Arc<BackendClient>,
    ledger: RwLock<Ledger>,
    clock: Clock,
    answer_frames: AnswerFrames,
}

impl SessionManager {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self {
            client,
            ledger: RwLock::new(Ledger::default()),
            clock: Arc::new(Utc::now),
            answer_frames: AnswerFrames::default(),
        }
    }

    /// Set how the backend's completion frames carry the answer.
    pub fn with_answer_frames(mut self, frames: AnswerFrames) -> Self {
        self.answer_frames = frames;
        self
    }

    pub fn answer_frames(&self) -> AnswerFrames {
        self.answer_frames
    }

    /// Replace the time source.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    async fn remember(&self, session_id: &str, chat_id: &str) {
        let now = self.now();
        let mut ledger = self.ledger.write().await;
        ledger.closed.retain(|id| id != session_id);
        ledger
            .open
            .entry(session_id.to_string())
            .and_modify(|record| record.last_active = now)
            .or_insert_with(|| SessionRecord {
                session_id: session_id.to_string(),
                chat_id: chat_id.to_string(),
                last_active: now,
            });
    }

    /// Create a session under `chat_id`. A blank name gets a default.
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        chat_id: &str,
        name: &str,
        user_id: Option<&str>,
    ) -> AppResult<ChatSession> {
        require("chat_id", chat_id)?;

        let name = match name.trim() {
            "" => DEFAULT_SESSION_NAME,
            trimmed => trimmed,
        };
        let mut body = json!({ "name": name });
        if let Some(user_id) = user_id.filter(|u| !u.trim().is_empty()) {
            body["user_id"] = Value::String(user_id.to_string());
        }

        let reply = self
            .client
            .post(&sessions_path(chat_id), AuthMode::ApiKey, body)
            .await?;
        let data = into_data(reply)?;

        let session = ChatSession::from_backend(&data, chat_id).ok_or_else(|| {
            AppError::Serialization("Session reply is missing an id".to_string())
        })?;

        self.remember(&session.id, chat_id).await;
        info!("Created session {} in chat {}", session.id, chat_id);
        Ok(session)
    }

    /// First page of sessions in `chat_id`, hiding locally closed ones unless
    /// `include_closed`.
    pub async fn list_sessions(
        &self,
        chat_id: &str,
        include_closed: bool,
    ) -> AppResult<Vec<ChatSession>> {
        self.list_sessions_page(chat_id, include_closed, &ListQuery::default())
            .await
    }

    #[instrument(skip(self, query))]
    pub async fn list_sessions_page(
        &self,
        chat_id: &str,
        include_closed: bool,
        query: &ListQuery,
    ) -> AppResult<Vec<ChatSession>> {
        require("chat_id", chat_id)?;

        let reply = self
            .client
            .get(&sessions_path(chat_id), AuthMode::ApiKey, &query.to_params())
            .await?;
        let data = into_data(reply)?;

        let sessions: Vec<ChatSession> = data
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| ChatSession::from_backend(item, chat_id))
                    .collect()
            })
            .unwrap_or_default();

        if include_closed {
            return Ok(sessions);
        }

        let ledger = self.ledger.read().await;
        let visible: Vec<ChatSession> = sessions
            .into_iter()
            .filter(|s| !ledger.is_closed(&s.id))
            .collect();
        debug!("{} sessions visible in chat {}", visible.len(), chat_id);
        Ok(visible)
    }

    /// Rename a session.
    #[instrument(skip(self))]
    pub async fn update_session(&self, chat_id: &str, session_id: &str, name: &str) -> AppResult<bool> {
        require("chat_id", chat_id)?;
        require("session_id", session_id)?;
        require("name", name)?;

        let path = format!("{}/{}", sessions_path(chat_id), session_id);
        let reply = self
            .client
            .put(&path, AuthMode::ApiKey, json!({ "name": name.trim() }))
            .await?;
        into_data(reply)?;

        Ok(true)
    }

    /// Delete sessions in one batch and forget their local records.
    #[instrument(skip(self))]
    pub async fn delete_sessions(&self, chat_id: &str, session_ids: &[String]) -> AppResult<bool> {
        require("chat_id", chat_id)?;
        if session_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one session id is required".to_string(),
            ));
        }

        let reply = self
            .client
            .delete(
                &sessions_path(chat_id),
                AuthMode::ApiKey,
                json!({ "ids": session_ids }),
            )
            .await?;
        into_data(reply)?;

        let mut ledger = self.ledger.write().await;
        for id in session_ids {
            ledger.forget(id);
        }
        info!("Deleted {} sessions from chat {}", session_ids.len(), chat_id);
        Ok(true)
    }

    /// Close a session, dropping its local record. With `delete_remote` the
    /// backend copy is deleted too. Closing an id this manager does not
    /// track changes nothing locally.
    pub async fn close_session(
        &self,
        chat_id: &str,
        session_id: &str,
        delete_remote: bool,
    ) -> AppResult<()> {
        require("session_id", session_id)?;

        if delete_remote {
            return self
                .delete_sessions(chat_id, &[session_id.to_string()])
                .await
                .map(|_| ());
        }

        if self.ledger.write().await.close(session_id) {
            info!("Closed session {} in chat {}", session_id, chat_id);
        } else {
            debug!("Session {} is not tracked, nothing to close", session_id);
        }
        Ok(())
    }

    /// Close every open session idle for longer than `threshold`, returning
    /// the ids closed. Remote sessions are left alone.
    pub async fn cleanup_inactive(&self, threshold: Duration) -> Vec<String> {
        let now = self.now();
        let mut ledger = self.ledger.write().await;

        let mut expired: Vec<String> = ledger
            .open
            .values()
            .filter(|r| {
                (now - r.last_active)
                    .to_std()
                    .map(|idle| idle > threshold)
                    .unwrap_or(false)
            })
            .map(|r| r.session_id.clone())
            .collect();

        expired.sort();
        for id in &expired {
            ledger.close(id);
        }
        if !expired.is_empty() {
            info!("Closed {} inactive sessions", expired.len());
        }
        expired
    }

    /// Mark a known session as active now. Returns false for unknown ids.
    pub async fn touch(&self, session_id: &str) -> bool {
        let now = self.now();
        match self.ledger.write().await.open.get_mut(session_id) {
            Some(record) => {
                record.last_active = now;
                true
            }
            None => false,
        }
    }

    /// Local record of an open session.
    pub async fn record(&self, session_id: &str) -> Option<SessionRecord> {
        self.ledger.read().await.open.get(session_id).cloned()
    }

    /// Ids of open sessions, sorted.
    pub async fn open_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ledger.read().await.open.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ask a question inside a session and stream the answer.
    ///
    /// Without `session_id` the backend opens a new session; its id arrives
    /// on the first frame.
    #[instrument(skip(self, question))]
    pub async fn ask(
        &self,
        chat_id: &str,
        session_id: Option<&str>,
        question: &str,
    ) -> AppResult<CompletionStream> {
        require("chat_id", chat_id)?;
        require("question", question)?;

        let mut body = json!({ "question": question, "stream": true });
        if let Some(session_id) = session_id {
            if self.ledger.read().await.is_closed(session_id) {
                warn!("Asking in locally closed session {}, reopening", session_id);
            }
            self.remember(session_id, chat_id).await;
            body["session_id"] = Value::String(session_id.to_string());
        }

        self.client
            .stream(&completions_path(chat_id), AuthMode::ApiKey, body)
            .await
    }

    /// [`ask`](Self::ask), drained into a single answer.
    pub async fn ask_blocking(
        &self,
        chat_id: &str,
        session_id: Option<&str>,
        question: &str,
    ) -> AppResult<SessionAnswer> {
        let mut stream = self.ask(chat_id, session_id, question).await?;
        let mut answer = SessionAnswer::new(self.answer_frames);

        while let Some(event) = stream.next().await {
            match event? {
                CompletionEvent::Partial(delta) => {
                    answer.absorb(&delta.answer);
                    if delta.session_id.is_some() {
                        answer.session_id = delta.session_id;
                    }
                    if delta.reference.as_ref().is_some_and(|r| !r.is_null()) {
                        answer.reference = delta.reference;
                    }
                }
                CompletionEvent::Final => break,
            }
        }

        if let Some(id) = &answer.session_id {
            if session_id.is_none() {
                self.remember(id, chat_id).await;
            }
        }

        Ok(answer)
    }
}
