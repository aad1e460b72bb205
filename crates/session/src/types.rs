//! Session types.

use chrono::{DateTime, Utc};
use ragent_core::config::AnswerFrames;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote chat session as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub chat_id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
}

impl ChatSession {
    /// Build from a backend session object. `chat_id` fills in when the
    /// object does not carry one.
    pub fn from_backend(value: &Value, chat_id: &str) -> Option<Self> {
        let id = value.get("id").and_then(Value::as_str)?.to_string();
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            id,
            chat_id: text("chat_id")
                .or_else(|| text("chat"))
                .unwrap_or_else(|| chat_id.to_string()),
            name: text("name").unwrap_or_default(),
            created_at: value
                .get("create_time")
                .and_then(Value::as_i64)
                .and_then(DateTime::from_timestamp_millis),
            user_id: text("user_id").filter(|u| !u.is_empty()),
        })
    }
}

/// Local bookkeeping for an open session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub chat_id: String,
    pub last_active: DateTime<Utc>,
}

/// Paging for session listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    /// Only sessions with this exact name
    pub name: Option<String>,
    pub desc: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 30,
            name: None,
            desc: true,
        }
    }
}

impl ListQuery {
    pub(crate) fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.max(1).to_string()),
            ("page_size", self.page_size.max(1).to_string()),
            ("orderby", "create_time".to_string()),
            ("desc", self.desc.to_string()),
        ];
        if let Some(name) = &self.name {
            params.push(("name", name.clone()));
        }
        params
    }
}

/// A completion gathered from a session stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionAnswer {
    pub answer: String,
    pub session_id: Option<String>,
    pub reference: Option<Value>,
    #[serde(skip)]
    frames: AnswerFrames,
}

impl SessionAnswer {
    pub fn new(frames: AnswerFrames) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    /// Fold one streamed frame in and return the text it added.
    ///
    /// A cumulative frame that does not extend the current answer replaces
    /// it, and nothing is reported as added.
    pub fn absorb(&mut self, frame: &str) -> &str {
        match self.frames {
            AnswerFrames::Incremental => {
                let start = self.answer.len();
                self.answer.push_str(frame);
                &self.answer[start..]
            }
            AnswerFrames::Cumulative => {
                let start = if frame.starts_with(self.answer.as_str()) {
                    self.answer.len()
                } else {
                    frame.len()
                };
                self.answer = frame.to_string();
                &self.answer[start..]
            }
        }
    }
}
