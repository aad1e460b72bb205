//! The orchestration graph.
//!
//! ```text
//! Classify -> DirectRetrieve | Decompose -> Retrieve -> GradeAggregate
//!                                              ^             |
//!                                              +- Continue <-+-> Synthesize -> Done
//! ```
//!
//! Passes run sequentially; the sub-queries of one pass are retrieved
//! concurrently and merged in sub-query order. Retrieval failures become
//! notes. Only a synthesis failure with no evidence fails the run.

use crate::config::AgentConfig;
use crate::events::{AgentEvent, EventSink};
use crate::plan::{parse_plan, parse_verdict, GradeVerdict, QueryInput, QueryPlan};
use crate::state::{AgentState, Phase, RetrievalOutcome, RetrievalRecord, Termination, ToolCalls};
use futures::StreamExt;
use ragent_core::{AppError, AppResult};
use ragent_llm::{ChatMessage, LlmClient, LlmRequest};
use ragent_prompt::{BuiltPrompt, PromptLibrary, CLASSIFY_PROMPT, GRADE_PROMPT, SYNTHESIZE_PROMPT};
use ragent_retrieval::{dedup_chunks, format_chunks_for_agent, ChunkRetriever, RetrievalChunk};
use ragent_session::SessionManager;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Input of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub question: String,
    pub dataset_ids: Vec<String>,
    /// Earlier turns of the conversation, oldest first
    pub history: Vec<ChatMessage>,
    /// Session whose activity the run refreshes
    pub session_id: Option<String>,
}

impl RunRequest {
    pub fn new(question: impl Into<String>, dataset_ids: Vec<String>) -> Self {
        Self {
            question: question.into(),
            dataset_ids,
            history: Vec::new(),
            session_id: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub answer: String,
    pub termination: Termination,
    /// Final state; `history` includes this question and answer
    pub state: AgentState,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn iterations(&self) -> u32 {
        self.state.iteration_count
    }

    pub fn evidence(&self) -> &[RetrievalChunk] {
        &self.state.evidence
    }

    pub fn notes(&self) -> &[String] {
        &self.state.notes
    }

    pub fn retrieval_history(&self) -> &[RetrievalRecord] {
        &self.state.retrieval_history
    }

    pub fn tool_calls(&self) -> ToolCalls {
        self.state.tool_calls
    }
}

/// Iterative retrieve-grade-synthesize agent.
pub struct AgentGraph {
    llm: Arc<dyn LlmClient>,
    retriever: Arc<dyn ChunkRetriever>,
    prompts: Arc<PromptLibrary>,
    config: AgentConfig,
    sessions: Option<Arc<SessionManager>>,
}

impl AgentGraph {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn ChunkRetriever>,
        prompts: Arc<PromptLibrary>,
        config: AgentConfig,
    ) -> Self {
        Self {
            llm,
            retriever,
            prompts,
            config,
            sessions: None,
        }
    }

    /// Refresh session activity for runs that carry a session id.
    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the graph to completion.
    ///
    /// With `events` attached, progress and every answer fragment are sent
    /// as they happen. `cancel` is checked at the top of each pass.
    ///
    /// # Errors
    /// - `Validation` for a blank question or an empty dataset list
    /// - `Cancelled` when `cancel` fires before a pass
    /// - `Agent` when synthesis fails and there is no evidence to fall back on
    pub async fn run(
        &self,
        request: RunRequest,
        events: Option<mpsc::Sender<AgentEvent>>,
        cancel: &CancellationToken,
    ) -> AppResult<RunResult> {
        if request.question.trim().is_empty() {
            return Err(AppError::Validation("question cannot be empty".to_string()));
        }
        if request.dataset_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one dataset_id is required".to_string(),
            ));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("agent_run", run_id = %run_id);
        self.execute(run_id, request, EventSink::new(events), cancel)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        run_id: String,
        request: RunRequest,
        sink: EventSink,
        cancel: &CancellationToken,
    ) -> AppResult<RunResult> {
        let started = Instant::now();
        let mut state = AgentState::new(
            request.question.trim(),
            request.history,
            self.config.max_iterations.max(1),
        );
        let datasets: Arc<[String]> = request.dataset_ids.into();
        self.touch_session(request.session_id.as_deref()).await;

        info!("Starting run for: {}", state.question);

        self.enter(&mut state, &sink, Phase::Classify).await;
        let plan = self.classify(&mut state).await;
        let input = QueryInput::from_plan(&plan, &state.question);
        let entry = if input.is_decomposed() {
            Phase::Decompose
        } else {
            Phase::DirectRetrieve
        };
        self.enter(&mut state, &sink, entry).await;
        let mut queries = input.queries();

        let termination = loop {
            if cancel.is_cancelled() {
                info!("Run cancelled after {} passes", state.iteration_count);
                return Err(AppError::Cancelled);
            }

            self.enter(&mut state, &sink, Phase::Retrieve).await;
            let fresh = self.retrieve_all(&mut state, &sink, &queries, &datasets).await;

            self.enter(&mut state, &sink, Phase::GradeAggregate).await;
            let mut pooled = std::mem::take(&mut state.evidence);
            pooled.extend(fresh);
            state.evidence = dedup_chunks(pooled);

            let verdict = self.grade(&mut state).await;
            state.complete_pass(verdict.sufficient);
            if !verdict.reasoning.trim().is_empty() {
                state.reasoning.push(verdict.reasoning.trim().to_string());
            }

            info!(
                "Pass {}/{}: {} evidence chunks, sufficient={}",
                state.iteration_count,
                state.max_iterations,
                state.evidence.len(),
                verdict.sufficient
            );
            sink.emit(AgentEvent::Graded {
                iteration: state.iteration_count,
                sufficient: verdict.sufficient,
                should_finish: state.should_finish,
                follow_up_queries: verdict.follow_up_queries.clone(),
            })
            .await;

            if state.should_finish {
                break if verdict.sufficient {
                    Termination::Sufficient
                } else {
                    Termination::IterationLimit
                };
            }

            self.enter(&mut state, &sink, Phase::Continue).await;
            queries = if verdict.follow_up_queries.is_empty() {
                vec![state.question.clone()]
            } else {
                verdict.follow_up_queries
            };
        };

        self.enter(&mut state, &sink, Phase::Synthesize).await;
        let answer = self.synthesize(&mut state, &sink).await?;

        state.history.push(ChatMessage::user(state.question.clone()));
        state.history.push(ChatMessage::assistant(answer.clone()));
        self.enter(&mut state, &sink, Phase::Done).await;

        sink.emit(AgentEvent::Finished {
            run_id: run_id.clone(),
            termination,
            iterations: state.iteration_count,
        })
        .await;
        self.touch_session(request.session_id.as_deref()).await;

        let elapsed = started.elapsed();
        info!(
            "Run finished ({}) after {} passes and {} tool calls in {:?}",
            termination.as_str(),
            state.iteration_count,
            state.tool_calls.total(),
            elapsed
        );

        Ok(RunResult {
            run_id,
            answer,
            termination,
            state,
            elapsed,
        })
    }

    async fn enter(&self, state: &mut AgentState, sink: &EventSink, phase: Phase) {
        debug!("Entering {}", phase.as_str());
        state.phase = phase;
        sink.emit(AgentEvent::Phase {
            phase,
            iteration: state.iteration_count,
        })
        .await;
    }

    async fn touch_session(&self, session_id: Option<&str>) {
        if let (Some(sessions), Some(id)) = (&self.sessions, session_id) {
            if !sessions.touch(id).await {
                debug!("Session {} is not tracked locally", id);
            }
        }
    }

    fn build_request(&self, built: BuiltPrompt, history: &[ChatMessage]) -> LlmRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = built.system {
            messages.push(ChatMessage::system(system));
        }
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(built.user));

        let mut request = LlmRequest::from_messages(messages, self.config.model.clone());
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;
        request
    }

    async fn complete(&self, prompt_id: &str, variables: &Value) -> AppResult<String> {
        let built = self.prompts.render(prompt_id, variables)?;
        let request = self.build_request(built, &[]);
        Ok(self.llm.complete(&request).await?.content)
    }

    async fn classify(&self, state: &mut AgentState) -> QueryPlan {
        state.tool_calls.classify += 1;
        let variables = json!({
            "question": state.question,
            "history": state.history,
        });

        let reply = self.complete(CLASSIFY_PROMPT, &variables).await;
        match reply.and_then(|text| parse_plan(&text)) {
            Ok(plan) => {
                info!(
                    "Question classified as {:?} ({} sub-queries)",
                    plan.kind,
                    plan.sub_queries.len()
                );
                plan
            }
            Err(e) => {
                state.note(format!(
                    "classification unavailable ({}), treating the question as simple",
                    e
                ));
                QueryPlan::simple()
            }
        }
    }

    /// Retrieve every query concurrently, bounded by `max_concurrency`.
    /// Results are recorded in query order whatever order they finish in.
    async fn retrieve_all(
        &self,
        state: &mut AgentState,
        sink: &EventSink,
        queries: &[String],
        datasets: &Arc<[String]>,
    ) -> Vec<RetrievalChunk> {
        let iteration = state.iteration_count + 1;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut handles = Vec::with_capacity(queries.len());
        for query in queries {
            let sem = Arc::clone(&semaphore);
            let retriever = Arc::clone(&self.retriever);
            let datasets = Arc::clone(datasets);
            let query = query.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| AppError::Agent(format!("Semaphore acquire failed: {e}")))?;
                retriever.retrieve(&query, &datasets).await
            }));
        }
        state.tool_calls.retrieve += queries.len() as u32;

        let mut chunks = Vec::new();
        for (query, handle) in queries.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(AppError::Agent(format!("Retrieval task failed: {e}"))),
            };

            match result {
                Ok(response) => {
                    info!(
                        "Sub-query {:?} returned {} chunks",
                        query,
                        response.chunks.len()
                    );
                    state.retrieval_history.push(RetrievalRecord {
                        iteration,
                        query: query.clone(),
                        outcome: RetrievalOutcome::Found {
                            chunks: response.chunks.len(),
                            total: response.total,
                        },
                    });
                    sink.emit(AgentEvent::Retrieval {
                        iteration,
                        query: query.clone(),
                        chunks: response.chunks.len(),
                    })
                    .await;
                    chunks.extend(response.chunks);
                }
                Err(e) => {
                    state.retrieval_history.push(RetrievalRecord {
                        iteration,
                        query: query.clone(),
                        outcome: RetrievalOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                    state.note(format!("retrieval for \"{}\" failed: {}", query, e));
                    sink.emit(AgentEvent::RetrievalFailed {
                        iteration,
                        query: query.clone(),
                        error: e.to_string(),
                    })
                    .await;
                }
            }
        }

        chunks
    }

    async fn grade(&self, state: &mut AgentState) -> GradeVerdict {
        state.tool_calls.grade += 1;

        let mut queries: Vec<&str> = Vec::new();
        for record in &state.retrieval_history {
            if !queries.contains(&record.query.as_str()) {
                queries.push(&record.query);
            }
        }
        let variables = json!({
            "question": state.question,
            "iteration": state.iteration_count + 1,
            "max_iterations": state.max_iterations,
            "queries": queries,
            "evidence": format_chunks_for_agent(&state.evidence, self.config.synthesis_max_chunks),
        });

        let reply = self.complete(GRADE_PROMPT, &variables).await;
        match reply.and_then(|text| parse_verdict(&text)) {
            Ok(verdict) => verdict,
            Err(e) => {
                let sufficient = !state.evidence.is_empty();
                state.note(format!(
                    "grading unavailable ({}), evidence judged {} by presence",
                    e,
                    if sufficient { "sufficient" } else { "insufficient" }
                ));
                GradeVerdict {
                    sufficient,
                    follow_up_queries: Vec::new(),
                    reasoning: String::new(),
                }
            }
        }
    }

    async fn synthesize(&self, state: &mut AgentState, sink: &EventSink) -> AppResult<String> {
        state.tool_calls.synthesize += 1;

        let evidence = format_chunks_for_agent(&state.evidence, self.config.synthesis_max_chunks);
        let retrievals: Vec<Value> = state
            .retrieval_history
            .iter()
            .map(|r| json!({"iteration": r.iteration, "query": r.query, "outcome": r.summary()}))
            .collect();
        let variables = json!({
            "question": state.question,
            "retrievals": retrievals,
            "notes": state.notes,
            "evidence": evidence,
        });

        let result = match self.prompts.render(SYNTHESIZE_PROMPT, &variables) {
            Ok(built) => {
                let request = self.build_request(built, &state.history);
                if sink.is_attached() {
                    self.stream_answer(&request, state, sink).await
                } else {
                    self.llm.complete(&request).await.map(|r| r.content)
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(answer) => Ok(answer),
            Err(e) if !state.evidence.is_empty() => {
                state.note(format!(
                    "synthesis failed ({}), answering with the retrieved evidence",
                    e
                ));
                let answer = format!(
                    "I could not compose a full answer, but the knowledge base returned the following.\n\n{}",
                    evidence
                );
                sink.emit(AgentEvent::AnswerDelta {
                    text: answer.clone(),
                })
                .await;
                Ok(answer)
            }
            Err(e) => Err(AppError::Agent(format!(
                "synthesis failed and no evidence was retrieved: {}",
                e
            ))),
        }
    }

    /// Forward each model fragment as it arrives.
    ///
    /// Once a fragment has reached the sink, a failing stream ends the
    /// answer with the text already sent instead of discarding it.
    async fn stream_answer(
        &self,
        request: &LlmRequest,
        state: &mut AgentState,
        sink: &EventSink,
    ) -> AppResult<String> {
        let mut stream = self.llm.stream(request).await?;
        let mut answer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) if answer.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!("Answer stream interrupted after {} bytes: {}", answer.len(), e);
                    state.note(format!("answer stream interrupted ({})", e));
                    break;
                }
            };
            if chunk.content.is_empty() {
                continue;
            }
            answer.push_str(&chunk.content);
            sink.emit(AgentEvent::AnswerDelta {
                text: chunk.content,
            })
            .await;
        }

        Ok(answer)
    }
}
