//! Query reformulation for better retrieval recall.

use std::sync::Arc;

use crate::llm::{GenerationParams, LanguageModel, LlmError, ModelRole};
use crate::prompts;

const MAX_REWRITE_CHARS: usize = 500;

const LABELS: &[&str] = &[
    "rewritten question:",
    "rewritten query:",
    "rewritten:",
    "question:",
    "query:",
];

pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Rewrite `question`. Falls back to `question` when the model returns
    /// nothing usable.
    pub async fn rewrite(&self, question: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let raw = self
            .llm
            .generate(
                ModelRole::Rewriter,
                prompts::QUESTION_REWRITER_SYSTEM,
                &prompts::question_rewriter_user(question),
                params,
            )
            .await?;

        let rewritten = sanitize_rewrite(&raw).unwrap_or_else(|| {
            tracing::warn!(raw_len = raw.len(), "Rewriter returned no usable text, keeping current question");
            question.to_string()
        });

        tracing::info!(original = %question, rewritten = %rewritten, "Query rewritten");
        Ok(rewritten)
    }
}

/// Reduce free-form model output to a single question line.
pub fn sanitize_rewrite(raw: &str) -> Option<String> {
    let line = raw
        .lines()
        .map(str::trim)
        .map(|l| l.trim_matches('`').trim())
        .find(|l| !l.is_empty())?;

    let without_label = LABELS
        .iter()
        .find_map(|label| {
            line.get(..label.len())
                .filter(|head| head.eq_ignore_ascii_case(label))
                .map(|_| line[label.len()..].trim())
        })
        .unwrap_or(line);

    let unquoted = without_label
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim();

    if unquoted.is_empty() {
        return None;
    }
    Some(unquoted.chars().take(MAX_REWRITE_CHARS).collect())
}
