//! Ask command handler.
//!
//! Runs the retrieval agent over one or more datasets and prints the answer.

use super::{backend_client, flush_stdout, print_json};
use clap::Args;
use ragent_agent::{AgentConfig, AgentEvent, AgentGraph, RunRequest, RunResult};
use ragent_core::{config::AppConfig, AppError, AppResult};
use ragent_llm::create_client;
use ragent_prompt::PromptLibrary;
use ragent_retrieval::{RetrievalOptions, RetrievalService};
use ragent_session::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Ask a question answered from the knowledge base
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Dataset to search (repeatable)
    #[arg(short, long = "dataset", required = true)]
    pub datasets: Vec<String>,

    /// Session whose activity this run refreshes
    #[arg(long)]
    pub session: Option<String>,

    /// Override the maximum number of retrieval passes
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Print pass-by-pass progress to stderr
    #[arg(long)]
    pub progress: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()?
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        let client = backend_client(config)?;
        let retriever = RetrievalService::new(client.clone())
            .with_defaults(RetrievalOptions::from_settings(&config.retrieval));
        let llm = create_client(&config.llm)?;
        let prompts = PromptLibrary::load(&config.workspace)?;

        let mut agent_config = AgentConfig::from_app(config);
        if let Some(max_iterations) = self.max_iterations {
            agent_config.max_iterations = max_iterations.max(1);
        }
        let buffer = agent_config.event_buffer;

        let agent = AgentGraph::new(llm, Arc::new(retriever), Arc::new(prompts), agent_config)
            .with_sessions(Arc::new(SessionManager::new(client)));

        let mut request = RunRequest::new(question, self.datasets.clone());
        if let Some(session) = &self.session {
            request = request.with_session(session.clone());
        }

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current pass");
                interrupt.cancel();
            }
        });

        let result = if self.streams_events() {
            let (tx, rx) = mpsc::channel(buffer);
            let printer = tokio::spawn(print_events(rx, self.progress, !self.no_stream && !self.json));
            let result = agent.run(request, Some(tx), &cancel).await;
            let printed = printer.await.unwrap_or(false);
            if printed {
                println!();
            }
            result?
        } else {
            agent.run(request, None, &cancel).await?
        };

        self.report(&result)
    }

    fn streams_events(&self) -> bool {
        self.progress || (!self.no_stream && !self.json)
    }

    fn report(&self, result: &RunResult) -> AppResult<()> {
        if self.json {
            return print_json(&serde_json::json!({
                "runId": result.run_id,
                "answer": result.answer,
                "termination": result.termination.as_str(),
                "iterations": result.iterations(),
                "toolCalls": result.tool_calls(),
                "retrievals": result.retrieval_history(),
                "notes": result.notes(),
                "evidence": result.evidence(),
                "elapsedMs": result.elapsed.as_millis() as u64,
            }));
        }

        if self.no_stream {
            println!("{}", result.answer);
        }

        tracing::debug!(
            "Run {} finished ({}) after {} passes, {} tool calls",
            result.run_id,
            result.termination.as_str(),
            result.iterations(),
            result.tool_calls().total()
        );
        for note in result.notes() {
            eprintln!("note: {}", note);
        }

        Ok(())
    }

    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(question) = &self.question {
            return Ok(Some(question.clone()));
        }
        match &self.file {
            Some(path) => std::fs::read_to_string(path)
                .map(|text| Some(text.trim().to_string()))
                .map_err(|e| AppError::Config(format!("Failed to read {:?}: {}", path, e))),
            None => Ok(None),
        }
    }
}

/// Print answer fragments to stdout and progress to stderr. Returns whether
/// any answer text was printed.
async fn print_events(
    mut rx: mpsc::Receiver<AgentEvent>,
    progress: bool,
    answer: bool,
) -> bool {
    let mut printed = false;
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::AnswerDelta { text } if answer => {
                print!("{}", text);
                flush_stdout();
                printed = true;
            }
            AgentEvent::AnswerDelta { .. } => {}
            AgentEvent::Phase { phase, iteration } if progress => {
                eprintln!("[pass {}] {}", iteration + 1, phase.as_str());
            }
            AgentEvent::Retrieval {
                query, chunks, ..
            } if progress => {
                eprintln!("  \"{}\": {} chunks", query, chunks);
            }
            AgentEvent::RetrievalFailed { query, error, .. } if progress => {
                eprintln!("  \"{}\" failed: {}", query, error);
            }
            AgentEvent::Graded {
                sufficient,
                follow_up_queries,
                ..
            } if progress => {
                eprintln!(
                    "  sufficient: {}{}",
                    sufficient,
                    if follow_up_queries.is_empty() {
                        String::new()
                    } else {
                        format!(", next: {}", follow_up_queries.join("; "))
                    }
                );
            }
            _ => {}
        }
    }
    printed
}
