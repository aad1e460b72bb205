//! Prompt system for ragent.
//!
//! - YAML prompt definitions, built in and overridable per workspace
//! - Handlebars rendering of system and user messages

pub mod builder;
pub mod library;
pub mod loader;
pub mod types;

pub use builder::build_prompt;
pub use library::{PromptLibrary, CLASSIFY_PROMPT, GRADE_PROMPT, SYNTHESIZE_PROMPT};
pub use loader::{load_prompt_file, parse_prompt, PROMPTS_DIR};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
