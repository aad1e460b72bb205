//! Run state carried through the orchestration graph.

use ragent_llm::ChatMessage;
use ragent_retrieval::RetrievalChunk;
use serde::Serialize;

/// Node of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Classify,
    DirectRetrieve,
    Decompose,
    Retrieve,
    GradeAggregate,
    Continue,
    Synthesize,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Classify => "classify",
            Phase::DirectRetrieve => "direct_retrieve",
            Phase::Decompose => "decompose",
            Phase::Retrieve => "retrieve",
            Phase::GradeAggregate => "grade_aggregate",
            Phase::Continue => "continue",
            Phase::Synthesize => "synthesize",
            Phase::Done => "done",
        }
    }
}

/// Why the loop stopped retrieving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The grader judged the evidence sufficient
    Sufficient,
    /// `max_iterations` passes ran without sufficient evidence
    IterationLimit,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Sufficient => "sufficient",
            Termination::IterationLimit => "iteration_limit",
        }
    }
}

/// Result of retrieving one sub-query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Found { chunks: usize, total: u64 },
    Failed { error: String },
}

/// One retrieval attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalRecord {
    /// Pass the attempt belongs to, starting at 1
    pub iteration: u32,
    pub query: String,
    pub outcome: RetrievalOutcome,
}

impl RetrievalRecord {
    /// Short human-readable outcome for prompts and logs.
    pub fn summary(&self) -> String {
        match &self.outcome {
            RetrievalOutcome::Found { chunks: 0, .. } => "no results".to_string(),
            RetrievalOutcome::Found { chunks, .. } => format!("{} chunks", chunks),
            RetrievalOutcome::Failed { error } => format!("failed: {}", error),
        }
    }
}

/// Model and retrieval calls made during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolCalls {
    pub classify: u32,
    pub retrieve: u32,
    pub grade: u32,
    pub synthesize: u32,
}

impl ToolCalls {
    pub fn total(&self) -> u32 {
        self.classify + self.retrieve + self.grade + self.synthesize
    }
}

/// Everything the graph knows about a run in progress.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub question: String,
    pub history: Vec<ChatMessage>,
    pub phase: Phase,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub should_finish: bool,
    pub retrieval_history: Vec<RetrievalRecord>,
    /// Deduplicated evidence pooled across every pass
    pub evidence: Vec<RetrievalChunk>,
    /// Degraded-evidence and fallback notes
    pub notes: Vec<String>,
    /// Grader reasoning, one entry per pass
    pub reasoning: Vec<String>,
    pub tool_calls: ToolCalls,
}

impl AgentState {
    pub fn new(question: impl Into<String>, history: Vec<ChatMessage>, max_iterations: u32) -> Self {
        Self {
            question: question.into(),
            history,
            phase: Phase::Classify,
            iteration_count: 0,
            max_iterations,
            should_finish: false,
            retrieval_history: Vec::new(),
            evidence: Vec::new(),
            notes: Vec::new(),
            reasoning: Vec::new(),
            tool_calls: ToolCalls::default(),
        }
    }

    /// Close one pass. The counter moves exactly once per call and the
    /// iteration bound forces `should_finish` regardless of `sufficient`.
    pub fn complete_pass(&mut self, sufficient: bool) {
        self.iteration_count += 1;
        self.should_finish = sufficient || self.iteration_count >= self.max_iterations;
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::warn!("{}", note);
        self.notes.push(note);
    }
}
