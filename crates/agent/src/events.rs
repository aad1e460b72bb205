//! Progress events emitted during a run.

use crate::state::{Phase, Termination};
use serde::Serialize;
use tokio::sync::mpsc;

/// Something observable happened in the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Phase {
        phase: Phase,
        iteration: u32,
    },
    Retrieval {
        iteration: u32,
        query: String,
        chunks: usize,
    },
    RetrievalFailed {
        iteration: u32,
        query: String,
        error: String,
    },
    Graded {
        iteration: u32,
        sufficient: bool,
        should_finish: bool,
        follow_up_queries: Vec<String>,
    },
    /// One fragment of the streamed answer, in arrival order
    AnswerDelta { text: String },
    Finished {
        run_id: String,
        termination: Termination,
        iterations: u32,
    },
}

/// Optional event channel. Sends wait for capacity; a closed receiver is
/// ignored so the run finishes regardless of who is listening.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<AgentEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<AgentEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                tracing::debug!("Event receiver dropped");
            }
        }
    }
}
