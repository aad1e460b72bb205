//! Agent orchestration for ragent.
//!
//! A run classifies the question, retrieves evidence for it (decomposed into
//! sub-queries when it has several parts), grades the pooled evidence and
//! loops with follow-up queries until the grader is satisfied or the pass
//! budget runs out, then synthesizes an answer from everything gathered.

pub mod config;
pub mod events;
pub mod graph;
pub mod plan;
pub mod state;

pub use config::AgentConfig;
pub use events::AgentEvent;
pub use graph::{AgentGraph, RunRequest, RunResult};
pub use plan::{GradeVerdict, QueryInput, QueryPlan, QuestionKind};
pub use state::{
    AgentState, Phase, RetrievalOutcome, RetrievalRecord, Termination, ToolCalls,
};
