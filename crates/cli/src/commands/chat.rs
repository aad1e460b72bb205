//! Chat command handler.
//!
//! Converses with a backend chat assistant inside a session, either for a
//! single question or interactively.

use super::{backend_client, flush_stdout, print_json};
use clap::Args;
use futures::StreamExt;
use ragent_client::CompletionEvent;
use ragent_core::{config::AppConfig, AppResult};
use ragent_session::{SessionAnswer, SessionManager};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Talk to a chat assistant in a session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Chat assistant id
    pub chat_id: String,

    /// Ask a single question and exit
    #[arg(short, long)]
    pub question: Option<String>,

    /// Continue an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Delete the session on the backend when the conversation ends
    #[arg(long)]
    pub delete_on_exit: bool,

    /// Output as JSON (single question only)
    #[arg(long, requires = "question")]
    pub json: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command for chat '{}'", self.chat_id);

        let manager = SessionManager::new(backend_client(config)?)
            .with_answer_frames(config.session.answer_frames);
        let idle = Duration::from_secs(config.session.idle_timeout_hours.max(1) * 60 * 60);

        let mut session_id = self.session.clone();
        if let Some(question) = &self.question {
            let answer = self.turn(&manager, session_id.as_deref(), question).await?;
            if self.json {
                print_json(&answer)?;
            }
            session_id = answer.session_id.or(session_id);
        } else {
            eprintln!("Type a question, or an empty line to quit.");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                eprint!("> ");
                let line = tokio::select! {
                    line = lines.next_line() => line?,
                    _ = tokio::signal::ctrl_c() => None,
                };
                let Some(line) = line.filter(|l| !l.trim().is_empty()) else {
                    break;
                };

                match self.turn(&manager, session_id.as_deref(), line.trim()).await {
                    Ok(answer) => session_id = answer.session_id.or(session_id),
                    Err(e) => eprintln!("error: {}", e),
                }

                let expired = manager.cleanup_inactive(idle).await;
                if !expired.is_empty() {
                    tracing::debug!("Closed idle sessions: {:?}", expired);
                }
            }
        }

        if let Some(id) = &session_id {
            manager
                .close_session(&self.chat_id, id, self.delete_on_exit)
                .await?;
            if !self.json {
                eprintln!("Session {}", id);
            }
        }

        Ok(())
    }

    /// Ask one question, printing the answer as it streams unless JSON
    /// output was requested.
    async fn turn(
        &self,
        manager: &SessionManager,
        session_id: Option<&str>,
        question: &str,
    ) -> AppResult<SessionAnswer> {
        let mut stream = manager.ask(&self.chat_id, session_id, question).await?;
        let mut answer = SessionAnswer::new(manager.answer_frames());

        while let Some(event) = stream.next().await {
            let delta = match event? {
                CompletionEvent::Partial(delta) => delta,
                CompletionEvent::Final => break,
            };

            let added = answer.absorb(&delta.answer);
            if !self.json && !added.is_empty() {
                print!("{}", added);
                flush_stdout();
            }

            if delta.session_id.is_some() {
                answer.session_id = delta.session_id;
            }
            if delta.reference.as_ref().is_some_and(|r| !r.is_null()) {
                answer.reference = delta.reference;
            }
        }

        if !self.json {
            println!();
        }
        Ok(answer)
    }
}
