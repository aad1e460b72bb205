//! Named prompt registry used by the agent graph.

use crate::builder::build_prompt;
use crate::loader::{load_prompt_file, parse_prompt, prompt_files, BUILTIN_PROMPTS, PROMPTS_DIR};
use crate::types::{BuiltPrompt, PromptDefinition};
use ragent_core::{AppError, AppResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const CLASSIFY_PROMPT: &str = "agent.classify";
pub const GRADE_PROMPT: &str = "agent.grade";
pub const SYNTHESIZE_PROMPT: &str = "agent.synthesize";

/// Prompt definitions by id.
///
/// Starts from the built-in set; workspace files replace built-ins with the
/// same id and may add new ones.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    definitions: BTreeMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Only the built-in definitions.
    pub fn builtin() -> AppResult<Self> {
        let mut definitions = BTreeMap::new();
        for (name, contents) in BUILTIN_PROMPTS {
            let definition = parse_prompt(contents, name)?;
            definitions.insert(definition.id.clone(), definition);
        }
        Ok(Self { definitions })
    }

    /// Built-ins overlaid with `.ragent/prompts` in `workspace`.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        let mut library = Self::builtin()?;
        let dir = workspace.join(PROMPTS_DIR);

        for path in prompt_files(&dir) {
            let definition = load_prompt_file(&path)?;
            if library.definitions.contains_key(&definition.id) {
                tracing::info!("Prompt {} overridden by {:?}", definition.id, path);
            }
            library.insert(definition);
        }

        Ok(library)
    }

    pub fn insert(&mut self, definition: PromptDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> Option<&PromptDefinition> {
        self.definitions.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    /// Render the prompt `id` with the given variables.
    pub fn render(&self, id: &str, variables: &Value) -> AppResult<BuiltPrompt> {
        let definition = self
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))?;
        build_prompt(definition, variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_has_agent_prompts() {
        let library = PromptLibrary::builtin().unwrap();
        assert_eq!(
            library.ids(),
            vec![CLASSIFY_PROMPT, GRADE_PROMPT, SYNTHESIZE_PROMPT]
        );
    }

    #[test]
    fn test_render_classify_with_history() {
        let library = PromptLibrary::builtin().unwrap();
        let built = library
            .render(
                CLASSIFY_PROMPT,
                &json!({
                    "question": "and the second one?",
                    "history": [{"role": "user", "content": "list the datasets"}],
                }),
            )
            .unwrap();

        assert!(built.user.contains("Question: and the second one?"));
        assert!(built.user.contains("user: list the datasets"));
        assert!(built.system.is_some());
        assert_eq!(built.metadata.output_format, "json");
    }

    #[test]
    fn test_render_synthesize_lists_searches() {
        let library = PromptLibrary::builtin().unwrap();
        let built = library
            .render(
                SYNTHESIZE_PROMPT,
                &json!({
                    "question": "Compare A and B",
                    "retrievals": [
                        {"query": "A", "outcome": "3 chunks"},
                        {"query": "B", "outcome": "failed: timeout"},
                    ],
                    "notes": ["retrieval for \"B\" failed"],
                    "evidence": "Found 3 relevant chunks:",
                }),
            )
            .unwrap();

        assert!(built.user.contains("- \"A\": 3 chunks"));
        assert!(built.user.contains("- \"B\": failed: timeout"));
        assert!(built.user.contains("Caveats:"));
        assert!(built.user.starts_with("Question: Compare A and B"));
    }

    #[test]
    fn test_unknown_prompt() {
        let library = PromptLibrary::builtin().unwrap();
        assert!(matches!(
            library.render("agent.missing", &json!({})),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_workspace_override_replaces_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join(PROMPTS_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("grade.yml"),
            "id: agent.grade\ntitle: Strict grader\napiVersion: \"1.1\"\ntemplate: \"Grade: {{question}}\"\noutput:\n  format: json\n",
        )
        .unwrap();

        let library = PromptLibrary::load(temp_dir.path()).unwrap();
        let built = library
            .render(GRADE_PROMPT, &json!({"question": "q"}))
            .unwrap();

        assert_eq!(built.user, "Grade: q");
        assert!(built.system.is_none());
        assert_eq!(library.ids().len(), 3);
    }

    #[test]
    fn test_load_without_prompts_dir() {
        let temp_dir = TempDir::new().unwrap();
        let library = PromptLibrary::load(temp_dir.path()).unwrap();
        assert_eq!(library.ids().len(), 3);
    }
}
