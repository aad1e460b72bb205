//! Prompt loader for YAML prompt definitions.

use crate::types::PromptDefinition;
use ragent_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Workspace-relative directory searched for prompt overrides.
pub const PROMPTS_DIR: &str = ".ragent/prompts";

/// Built-in definitions shipped with the crate, as (file name, YAML).
pub(crate) const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (
        "agent.classify.yml",
        include_str!("../prompts/agent.classify.yml"),
    ),
    ("agent.grade.yml", include_str!("../prompts/agent.grade.yml")),
    (
        "agent.synthesize.yml",
        include_str!("../prompts/agent.synthesize.yml"),
    ),
];

/// Parse and validate a definition from YAML text.
pub fn parse_prompt(contents: &str, source: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", source, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Load a prompt definition from a file.
pub fn load_prompt_file(path: &Path) -> AppResult<PromptDefinition> {
    tracing::debug!("Loading prompt from: {:?}", path);

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Prompt(format!("Failed to read prompt file {:?}: {}", path, e))
    })?;

    let definition = parse_prompt(&contents, &path.display().to_string())?;
    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);
    Ok(definition)
}

/// Prompt files (`.yml` / `.yaml`) in a prompts directory, sorted by path.
pub fn prompt_files(prompts_dir: &Path) -> Vec<PathBuf> {
    if !prompts_dir.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|s| s.to_str()),
                    Some("yml") | Some("yaml")
                )
        })
        .collect();

    files.sort();
    files
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
