//! Answer generation, with or without document context.

use std::sync::Arc;

use crate::config::GenerationSettings;
use crate::llm::{GenerationParams, LanguageModel, LlmError, ModelRole};
use crate::prompts;
use crate::types::{format_documents, Document};

/// Temperature for generation `attempt` (1-based).
///
/// The first attempt uses `base`. Later attempts add
/// `retry_temperature_increment` per attempt above the first, capped at
/// `max_temperature`, when retry variation is enabled.
pub fn escalated_temperature(base: f64, attempt: u32, settings: &GenerationSettings) -> f64 {
    if attempt <= 1 || !settings.enable_retry_variation {
        return base;
    }
    let escalated = base + f64::from(attempt - 1) * settings.retry_temperature_increment;
    escalated.min(settings.max_temperature)
}

pub struct Generator {
    llm: Arc<dyn LanguageModel>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Answer `question` from the given documents.
    pub async fn generate(
        &self,
        question: &str,
        documents: &[Document],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let context = format_documents(documents);
        tracing::debug!(
            documents = documents.len(),
            context_len = context.len(),
            temperature = params.temperature,
            "Generating grounded answer"
        );
        let answer = self
            .llm
            .generate(
                ModelRole::Chat,
                prompts::ANSWER_GENERATOR_SYSTEM,
                &prompts::answer_generator_user(question, &context),
                params,
            )
            .await?;
        tracing::info!(answer_len = answer.len(), "Generated answer");
        Ok(answer)
    }

    /// Answer `question` from model knowledge alone.
    pub async fn generate_without_context(
        &self,
        question: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let answer = self
            .llm
            .generate(
                ModelRole::Chat,
                prompts::PURE_LLM_SYSTEM,
                &prompts::pure_llm_user(question),
                params,
            )
            .await?;
        tracing::info!(answer_len = answer.len(), "Generated answer without context");
        Ok(answer)
    }
}
