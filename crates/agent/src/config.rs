//! Agent run configuration.

use ragent_core::AppConfig;

/// Bounds and model parameters for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Passes before the loop is forced to synthesize
    pub max_iterations: u32,
    /// Sub-queries retrieved at once
    pub max_concurrency: usize,
    /// Evidence chunks rendered into grade and synthesis prompts
    pub synthesis_max_chunks: usize,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Capacity of the event channel a caller creates for a run
    pub event_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_concurrency: 4,
            synthesis_max_chunks: 12,
            model: "llama3.2".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            event_buffer: 64,
        }
    }
}

impl AgentConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations.max(1),
            max_concurrency: config.agent.max_concurrency.max(1),
            synthesis_max_chunks: config.agent.synthesis_max_chunks,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            ..Self::default()
        }
    }
}
