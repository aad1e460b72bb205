//! ragent CLI
//!
//! Main entry point for the ragent command-line tool: agentic question
//! answering, retrieval and chat sessions against a RAGFlow-style backend.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, RetrieveCommand, SessionCommand};
use ragent_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppResult,
};
use std::path::PathBuf;
use tracing::Instrument;

/// ragent - retrieval-augmented answers from your knowledge base
#[derive(Parser, Debug)]
#[command(name = "ragent")]
#[command(about = "Retrieval-augmented answers from your knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGENT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// LLM provider (ollama, mock)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question with the retrieval agent
    Ask(AskCommand),

    /// Retrieve chunks for a query
    Retrieve(RetrieveCommand),

    /// Chat session management
    Session(SessionCommand),

    /// Talk to a chat assistant in a session
    Chat(ChatCommand),
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    LogFormat::parse(s).ok_or_else(|| format!("unknown log format: {}", s))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load configuration, then apply CLI overrides
    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.base_url,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.log_format,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;
    config.validate()?;

    // Log startup
    tracing::info!("ragent starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("LLM: {} / {}", config.llm.provider, config.llm.model);

    // Emit the command span
    let command = &cli.command;
    let command_name = match command {
        Commands::Ask(_) => "ask",
        Commands::Retrieve(_) => "retrieve",
        Commands::Session(_) => "session",
        Commands::Chat(_) => "chat",
    };
    let span = tracing::info_span!("command", name = command_name);

    // Route to command handlers
    let result = async {
        match command {
            Commands::Ask(cmd) => cmd.execute(&config).await,
            Commands::Retrieve(cmd) => cmd.execute(&config).await,
            Commands::Session(cmd) => cmd.execute(&config).await,
            Commands::Chat(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(span.clone())
    .await;

    // Log completion
    let _guard = span.enter();
    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed ({}): {}", e.kind(), e),
    }

    result
}
