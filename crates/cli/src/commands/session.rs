//! Session command handler.
//!
//! Manages chat sessions on the backend.

use super::{backend_client, print_json};
use clap::{Args, Subcommand};
use ragent_core::{config::AppConfig, AppError, AppResult};
use ragent_session::{ListQuery, SessionManager};

/// Chat session management
#[derive(Args, Debug)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Create a session
    Create(SessionCreateCommand),
    /// List sessions of a chat
    List(SessionListCommand),
    /// Rename a session
    Rename(SessionRenameCommand),
    /// Delete sessions
    Delete(SessionDeleteCommand),
}

impl SessionCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let manager = SessionManager::new(backend_client(config)?);
        match &self.action {
            SessionAction::Create(cmd) => cmd.execute(&manager).await,
            SessionAction::List(cmd) => cmd.execute(&manager).await,
            SessionAction::Rename(cmd) => cmd.execute(&manager).await,
            SessionAction::Delete(cmd) => cmd.execute(&manager).await,
        }
    }
}

/// Create a session
#[derive(Args, Debug)]
pub struct SessionCreateCommand {
    /// Chat assistant id
    pub chat_id: String,

    /// Session name
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// Owner of the session
    #[arg(long)]
    pub user_id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SessionCreateCommand {
    pub async fn execute(&self, manager: &SessionManager) -> AppResult<()> {
        tracing::info!("Creating session in chat '{}'", self.chat_id);

        let session = manager
            .create_session(&self.chat_id, &self.name, self.user_id.as_deref())
            .await?;

        if self.json {
            print_json(&session)
        } else {
            println!("{}\t{}", session.id, session.name);
            Ok(())
        }
    }
}

/// List sessions of a chat
#[derive(Args, Debug)]
pub struct SessionListCommand {
    /// Chat assistant id
    pub chat_id: String,

    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Sessions per page
    #[arg(long, default_value = "30")]
    pub page_size: u32,

    /// Only sessions with this exact name
    #[arg(long)]
    pub name: Option<String>,

    /// Oldest first
    #[arg(long)]
    pub asc: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SessionListCommand {
    pub async fn execute(&self, manager: &SessionManager) -> AppResult<()> {
        let query = ListQuery {
            page: self.page,
            page_size: self.page_size,
            name: self.name.clone(),
            desc: !self.asc,
        };
        let sessions = manager
            .list_sessions_page(&self.chat_id, true, &query)
            .await?;

        if self.json {
            return print_json(&sessions);
        }

        if sessions.is_empty() {
            println!("No sessions in chat {}", self.chat_id);
            return Ok(());
        }
        for session in sessions {
            let created = session
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}\t{}\t{}", session.id, created, session.name);
        }
        Ok(())
    }
}

/// Rename a session
#[derive(Args, Debug)]
pub struct SessionRenameCommand {
    pub chat_id: String,
    pub session_id: String,
    pub name: String,
}

impl SessionRenameCommand {
    pub async fn execute(&self, manager: &SessionManager) -> AppResult<()> {
        manager
            .update_session(&self.chat_id, &self.session_id, &self.name)
            .await?;
        println!("Renamed {} to {}", self.session_id, self.name);
        Ok(())
    }
}

/// Delete sessions
#[derive(Args, Debug)]
pub struct SessionDeleteCommand {
    pub chat_id: String,

    /// Session ids to delete
    #[arg(required = true)]
    pub session_ids: Vec<String>,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl SessionDeleteCommand {
    pub async fn execute(&self, manager: &SessionManager) -> AppResult<()> {
        if !self.yes {
            return Err(AppError::Validation(format!(
                "Refusing to delete {} sessions without --yes",
                self.session_ids.len()
            )));
        }

        manager
            .delete_sessions(&self.chat_id, &self.session_ids)
            .await?;
        println!("Deleted {} sessions", self.session_ids.len());
        Ok(())
    }
}
