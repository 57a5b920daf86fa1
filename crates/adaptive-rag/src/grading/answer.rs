use std::sync::Arc;

use super::{grade, BinaryVerdict};
use crate::llm::{LanguageModel, LlmError};
use crate::prompts;

/// Checks whether an answer addresses the question it was generated for.
pub struct AnswerGrader {
    llm: Arc<dyn LanguageModel>,
}

impl AnswerGrader {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn addresses_question(&self, question: &str, generation: &str) -> Result<bool, LlmError> {
        let verdict: BinaryVerdict = grade(
            self.llm.as_ref(),
            prompts::ANSWER_GRADER_SYSTEM,
            &prompts::answer_grader_user(question, generation),
        )
        .await?;
        let useful = verdict.binary_score.is_yes();
        tracing::info!(addresses_question = useful, "Answer graded");
        Ok(useful)
    }
}
