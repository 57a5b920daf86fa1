//! Grounding check with batched, early-exit evidence checking.

use std::sync::Arc;

use super::{grade, BinaryVerdict};
use crate::config::HallucinationConfig;
use crate::llm::LanguageModel;
use crate::prompts;
use crate::types::{format_documents, Document};

pub struct HallucinationGrader {
    llm: Arc<dyn LanguageModel>,
    config: HallucinationConfig,
}

impl HallucinationGrader {
    pub fn new(llm: Arc<dyn LanguageModel>, config: HallucinationConfig) -> Self {
        Self { llm, config }
    }

    /// True as soon as any batch of documents supports `generation`.
    ///
    /// A batch whose grading call fails is skipped. An empty document set is
    /// never grounded.
    pub async fn is_grounded(&self, documents: &[Document], generation: &str) -> bool {
        if documents.is_empty() {
            tracing::warn!("No documents to check grounding against");
            return false;
        }

        let batch_size = self.config.batch_size.max(1);
        let total = documents.len();
        let mut batches_checked = 0;

        for (batch_idx, batch) in documents.chunks(batch_size).enumerate() {
            let first = batch_idx * batch_size + 1;
            let last = first + batch.len() - 1;
            batches_checked += 1;

            tracing::info!(
                batch = batch_idx + 1,
                first_doc = first,
                last_doc = last,
                total_documents = total,
                "Hallucination check"
            );

            let user_prompt = prompts::hallucination_grader_user(&format_documents(batch), generation);
            let verdict = match grade::<BinaryVerdict>(
                self.llm.as_ref(),
                prompts::HALLUCINATION_GRADER_SYSTEM,
                &user_prompt,
            )
            .await
            {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(batch = batch_idx + 1, error = %e, "Hallucination grading batch failed, skipping");
                    continue;
                }
            };

            if verdict.binary_score.is_yes() {
                tracing::info!(batch = batch_idx + 1, first_doc = first, last_doc = last, "Generation grounded");
                return true;
            }
            tracing::debug!(batch = batch_idx + 1, "Not grounded in batch, checking next");
        }

        tracing::info!(batches = batches_checked, total_documents = total, "Generation not grounded in any batch");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::testing::{binary, GradeKind, ScriptedModel};
    use crate::types::SourceType;

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("doc-{}", i), SourceType::Pdf))
            .collect()
    }

    #[tokio::test]
    async fn test_early_exit_on_first_grounded_batch() {
        let model = Arc::new(ScriptedModel::new().with_grades(|_, _| Ok(binary(true))));
        let grader = HallucinationGrader::new(model.clone(), HallucinationConfig::default());

        assert!(grader.is_grounded(&docs(6), "answer").await);
        assert_eq!(model.grade_calls(GradeKind::Hallucination), 1);
    }

    #[tokio::test]
    async fn test_grounded_in_second_batch() {
        let model = Arc::new(ScriptedModel::new().with_grades(|_, user| {
            Ok(binary(user.contains("doc-4")))
        }));
        let grader = HallucinationGrader::new(model.clone(), HallucinationConfig::default());

        assert!(grader.is_grounded(&docs(5), "answer").await);
        assert_eq!(model.grade_calls(GradeKind::Hallucination), 2);
        let prompts = model.grade_prompts(GradeKind::Hallucination);
        assert!(prompts[0].contains("doc-0\n\ndoc-1\n\ndoc-2"));
        assert!(!prompts[0].contains("doc-3"));
    }

    #[tokio::test]
    async fn test_not_grounded_after_all_batches() {
        let model = Arc::new(ScriptedModel::new().with_grades(|_, _| Ok(binary(false))));
        let grader = HallucinationGrader::new(model.clone(), HallucinationConfig::default());

        assert!(!grader.is_grounded(&docs(7), "answer").await);
        assert_eq!(model.grade_calls(GradeKind::Hallucination), 3);
    }

    #[tokio::test]
    async fn test_failing_batch_is_skipped() {
        let model = Arc::new(ScriptedModel::new().with_grades(|_, user| {
            if user.contains("doc-0") {
                Err(LlmError::parse("garbage"))
            } else {
                Ok(binary(true))
            }
        }));
        let grader = HallucinationGrader::new(model.clone(), HallucinationConfig::default());

        assert!(grader.is_grounded(&docs(4), "answer").await);
        assert_eq!(model.grade_calls(GradeKind::Hallucination), 2);
    }

    #[tokio::test]
    async fn test_no_documents_is_not_grounded() {
        let model = Arc::new(ScriptedModel::new());
        let grader = HallucinationGrader::new(model.clone(), HallucinationConfig::default());

        assert!(!grader.is_grounded(&[], "answer").await);
        assert_eq!(model.grade_calls(GradeKind::Hallucination), 0);
    }
}
