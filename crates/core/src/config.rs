//! Configuration management for ragent.
//!
//! Configuration is resolved once at process start and passed by reference
//! to every component. Sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.ragent/config.yaml` or `RAGENT_CONFIG`)
//! - Environment variables
//! - Command-line flags (see [`AppConfig::with_overrides`])

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Model providers the workspace knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Workspace root (contains `.ragent/`)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Remote retrieval/completion backend
    pub backend: BackendConfig,

    /// Model used by the agent graph
    pub llm: LlmSettings,

    /// Default retrieval parameters
    pub retrieval: RetrievalSettings,

    /// Agent loop bounds
    pub agent: AgentSettings,

    /// Session bookkeeping
    pub session: SessionSettings,

    /// Log filter override
    pub log_level: Option<String>,

    /// Log line format
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Connection settings for the retrieval backend.
///
/// Credentials are optional here; the protocol client refuses to build
/// without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub login_token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Total attempts for 5xx responses (first try included)
    pub max_attempts: u32,
    /// Fixed delay between 5xx attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            login_token: None,
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    pub provider: String,
    pub endpoint: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: None,
            model: "llama3.2".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

/// Default retrieval parameters sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalSettings {
    pub similarity_threshold: f64,
    pub vector_similarity_weight: f64,
    pub top_k: u32,
    pub page_size: u32,
    /// Chunks rendered per tool result
    pub max_formatted_chunks: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.2,
            vector_similarity_weight: 0.3,
            top_k: 1024,
            page_size: 30,
            max_formatted_chunks: 5,
        }
    }
}

/// Agent loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub max_concurrency: usize,
    /// Chunks rendered into the synthesis prompt
    pub synthesis_max_chunks: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_concurrency: 4,
            synthesis_max_chunks: 12,
        }
    }
}

/// Session bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSettings {
    pub idle_timeout_hours: u64,
    /// How the backend's completion frames carry the answer
    pub answer_frames: AnswerFrames,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_hours: 24,
            answer_frames: AnswerFrames::default(),
        }
    }
}

/// Shape of the answer text in streamed completion frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFrames {
    /// Every frame repeats the whole answer so far
    #[default]
    Cumulative,
    /// Every frame carries only the new text
    Incremental,
}

/// Full configuration file structure. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    backend: Option<BackendConfig>,
    llm: Option<LlmSettings>,
    retrieval: Option<RetrievalSettings>,
    agent: Option<AgentSettings>,
    session: Option<SessionSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<LogFormat>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            backend: BackendConfig::default(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            agent: AgentSettings::default(),
            session: SessionSettings::default(),
            log_level: None,
            log_format: LogFormat::default(),
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file and environment.
    ///
    /// Environment variables:
    /// - `RAGENT_WORKSPACE`, `RAGENT_CONFIG`
    /// - `RAGENT_BASE_URL`, `RAGENT_API_KEY`, `RAGENT_LOGIN_TOKEN`
    /// - `RAGENT_LLM_PROVIDER`, `RAGENT_LLM_ENDPOINT`, `RAGENT_MODEL`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use ragent_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Backend: {:?}", config.backend.base_url);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGENT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RAGENT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.ragent_dir().join("config.yaml"));

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        }

        config.apply_env();
        Ok(config)
    }

    /// Merge a YAML config file into this config.
    pub fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        if let Some(backend) = file.backend {
            self.backend = backend;
        }
        if let Some(llm) = file.llm {
            self.llm = llm;
        }
        if let Some(retrieval) = file.retrieval {
            self.retrieval = retrieval;
        }
        if let Some(agent) = file.agent {
            self.agent = agent;
        }
        if let Some(session) = file.session {
            self.session = session;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(format) = logging.format {
                self.log_format = format;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(())
    }

    /// Environment variables override the config file.
    fn apply_env(&mut self) {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(url) = env("RAGENT_BASE_URL") {
            self.backend.base_url = Some(url);
        }
        if let Some(key) = env("RAGENT_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(token) = env("RAGENT_LOGIN_TOKEN") {
            self.backend.login_token = Some(token);
        }
        if let Some(provider) = env("RAGENT_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(endpoint) = env("RAGENT_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Some(model) = env("RAGENT_MODEL") {
            self.llm.model = model;
        }
        if let Some(level) = env("RUST_LOG") {
            self.log_level = Some(level);
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over the environment and config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        base_url: Option<String>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        log_format: Option<LogFormat>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }
        if let Some(base_url) = base_url {
            self.backend.base_url = Some(base_url);
        }
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }
        if let Some(model) = model {
            self.llm.model = model;
        }
        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }
        if let Some(log_format) = log_format {
            self.log_format = log_format;
        }
        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }
        if no_color {
            self.no_color = true;
        }
        self
    }

    /// Path to the `.ragent` directory.
    pub fn ragent_dir(&self) -> PathBuf {
        self.workspace.join(".ragent")
    }

    /// Directory holding prompt template overrides.
    pub fn prompts_dir(&self) -> PathBuf {
        self.ragent_dir().join("prompts")
    }

    /// Validate settings that do not involve credentials.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.llm.provider.to_lowercase();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.agent.max_iterations == 0 {
            return Err(AppError::Config(
                "agent.maxIterations must be at least 1".to_string(),
            ));
        }

        if self.agent.max_concurrency == 0 {
            return Err(AppError::Config(
                "agent.maxConcurrency must be at least 1".to_string(),
            ));
        }

        if self.backend.max_attempts == 0 {
            return Err(AppError::Config(
                "backend.maxAttempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.backend.max_attempts, 3);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.session.idle_timeout_hours, 24);
        assert!(config.backend.api_key.is_none());
        assert!(!config.verbose);
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(
            None,
            Some("http://ragflow:9380".to_string()),
            Some("mock".to_string()),
            Some("qwen2.5".to_string()),
            None,
            Some(LogFormat::Json),
            true,
            false,
        );

        assert_eq!(config.backend.base_url.as_deref(), Some("http://ragflow:9380"));
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.llm.model, "qwen2.5");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
backend:
  baseUrl: "http://localhost:9380/"
  apiKey: "ragflow-key"
  loginToken: "token"
  timeoutSecs: 10
  maxAttempts: 5
  retryDelayMs: 250
agent:
  maxIterations: 3
  maxConcurrency: 2
  synthesisMaxChunks: 8
session:
  answerFrames: incremental
logging:
  level: warn
  color: false
  format: json
"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.merge_yaml(&path).unwrap();

        assert_eq!(config.backend.api_key.as_deref(), Some("ragflow-key"));
        assert_eq!(config.backend.max_attempts, 5);
        assert_eq!(config.backend.retry_delay_ms, 250);
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.session.answer_frames, AnswerFrames::Incremental);
        assert_eq!(config.session.idle_timeout_hours, 24);
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.no_color);
        // Untouched sections keep defaults
        assert_eq!(config.retrieval.top_k, 1024);
    }

    #[test]
    fn test_merge_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "backend: [not, a, map").unwrap();

        let mut config = AppConfig::default();
        assert!(matches!(config.merge_yaml(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_iterations() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_defaults() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
