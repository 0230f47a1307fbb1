use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::document::ScoredChunk;

/// Phrase the model is told to answer with when the context does not cover the question.
pub const FALLBACK_ANSWER: &str = "I don't know.";

/// Separator placed between retrieved chunks in the rendered context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

const DEFAULT_TEMPLATE: &str = "You are a coding assistant. Answer using ONLY the provided context, \
focusing on code and technical details. If the context is insufficient, say \"I don't know.\"
Context: {context}
Question: {question}
Answer:
";

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(context|question)\}").expect("placeholder regex is valid"))
}

/// Instruction template with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn from_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute the chunks (in the given order) and the question.
    ///
    /// Substitution is single-pass: braces inside retrieved code are left untouched.
    pub fn render(&self, chunks: &[ScoredChunk], question: &str) -> String {
        let context = chunks
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        placeholder()
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "context" => context.clone(),
                _ => question.to_string(),
            })
            .into_owned()
    }
}
