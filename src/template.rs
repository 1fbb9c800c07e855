//! # Prompt templates
//!
//! The query pipeline renders one prompt per question from a
//! [`PromptTemplate`]: an optional system prompt plus a body containing the
//! `{context}` and `{question}` placeholders.
//!
//! The built-in template tells the model to answer only from the retrieved
//! context and to say "I don't know" otherwise. A different one can be dropped
//! into the configuration directory and selected with the `template` config key:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! # ~/.config/doku/templates/strict.yaml
//! system_prompt: "You are a careful assistant for document questions."
//! prompt: |
//!   Use only this context:
//!   {context}
//!
//!   Question: {question}
//! ```
//!
//! `doku init` writes the built-in template to `templates/rag_question.yaml` as
//! a starting point.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{DokuError, Result};

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Name of the template file `doku init` writes.
pub const DEFAULT_TEMPLATE_NAME: &str = "rag_question";

const DEFAULT_PROMPT: &str = r#"Answer the question using ONLY the context below.
If the answer is not in the context, say "I don't know".

Context:
{context}

Question:
{question}
"#;

/// A reusable RAG prompt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PromptTemplate {
    /// Sent as the system message when present.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// User message body; must contain `{context}` and `{question}`.
    pub prompt: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt: None,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Ensures both placeholders are present.
    pub fn validate(&self) -> Result<()> {
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !self.prompt.contains(placeholder) {
                return Err(DokuError::Template(format!(
                    "prompt is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(())
    }

    /// Substitutes the retrieved context and the user's question at every
    /// occurrence of their placeholders.
    ///
    /// Placeholders are located in the template only, so a context or question
    /// that happens to contain `{question}` or `{context}` is left untouched.
    pub fn render(&self, context: &str, question: &str) -> String {
        self.prompt
            .split(QUESTION_PLACEHOLDER)
            .map(|part| part.replace(CONTEXT_PLACEHOLDER, context))
            .collect::<Vec<_>>()
            .join(question)
    }
}

/// Load a prompt template by name from the user's config directory.
///
/// Resolves `<config_dir>/templates/<name>.yaml`.
pub fn load_template(name: &str) -> Result<PromptTemplate> {
    load_template_from(&crate::config_dir()?.join("templates"), name)
}

/// Load `<dir>/<name>.yaml` and validate it.
pub fn load_template_from(dir: &Path, name: &str) -> Result<PromptTemplate> {
    let path = dir.join(format!("{name}.yaml"));

    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(&path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    template.validate()?;
    Ok(template)
}
