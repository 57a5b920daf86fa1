//! Per-document relevance grading with a confidence gate.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{grade, ScoredVerdict};
use crate::config::DocumentGradingConfig;
use crate::llm::{LanguageModel, LlmError};
use crate::prompts;
use crate::types::Document;

const PREVIEW_CHARS: usize = 200;

/// Outcome of grading one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentGrade {
    pub index: usize,
    pub content_preview: String,
    /// Label was "yes" and confidence cleared the threshold
    pub is_relevant: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub error: Option<String>,
}

/// Result of one grading step: the surviving documents in retrieval order
/// plus a record for every document graded.
#[derive(Debug, Clone, Default)]
pub struct GradingReport {
    pub kept: Vec<Document>,
    pub grades: Vec<DocumentGrade>,
}

pub struct DocumentGrader {
    llm: Arc<dyn LanguageModel>,
    config: DocumentGradingConfig,
}

impl DocumentGrader {
    pub fn new(llm: Arc<dyn LanguageModel>, config: DocumentGradingConfig) -> Self {
        Self { llm, config }
    }

    /// Grade every document against `question`.
    ///
    /// Documents are graded concurrently in batches of `batch_size`. A document
    /// whose grading fails (after retrying transient errors) is dropped.
    pub async fn grade_documents(&self, question: &str, documents: Vec<Document>) -> GradingReport {
        let batch_size = self.config.batch_size.max(1);
        let total = documents.len();
        let mut grades = Vec::with_capacity(total);

        for (batch_idx, batch) in documents.chunks(batch_size).enumerate() {
            let offset = batch_idx * batch_size;
            tracing::debug!(
                batch = batch_idx + 1,
                size = batch.len(),
                total_documents = total,
                "Grading document batch"
            );
            let results = join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(i, doc)| self.grade_one(question, doc, offset + i)),
            )
            .await;
            grades.extend(results);
        }

        let kept: Vec<Document> = documents
            .into_iter()
            .zip(grades.iter())
            .filter(|(_, g)| g.is_relevant)
            .map(|(d, _)| d)
            .collect();

        tracing::info!(
            graded = total,
            kept = kept.len(),
            threshold = self.config.confidence_threshold,
            "Filtered documents by relevance"
        );

        GradingReport { kept, grades }
    }

    async fn grade_one(&self, question: &str, doc: &Document, index: usize) -> DocumentGrade {
        let user_prompt = prompts::document_grader_user(&doc.content, question);
        let policy = self.config.retry_policy();

        let outcome: Result<ScoredVerdict, LlmError> = policy
            .run(
                |_| grade::<ScoredVerdict>(self.llm.as_ref(), prompts::DOCUMENT_GRADER_SYSTEM, &user_prompt),
                LlmError::is_transient,
            )
            .await;

        match outcome {
            Ok(verdict) => {
                let is_relevant = verdict.binary_score.is_yes()
                    && verdict.confidence >= self.config.confidence_threshold;
                tracing::debug!(
                    document = index + 1,
                    label = ?verdict.binary_score,
                    confidence = verdict.confidence,
                    accepted = is_relevant,
                    "Document graded"
                );
                DocumentGrade {
                    index,
                    content_preview: doc.preview(PREVIEW_CHARS),
                    is_relevant,
                    confidence: verdict.confidence,
                    reasoning: verdict.reasoning,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    document = index + 1,
                    error = %e,
                    "Document grading failed, treating as not relevant"
                );
                DocumentGrade {
                    index,
                    content_preview: doc.preview(PREVIEW_CHARS),
                    is_relevant: false,
                    confidence: 0.0,
                    reasoning: String::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationParams, ModelRole, OutputShape};
    use crate::testing::{scored, ScriptedModel};
    use crate::types::SourceType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn docs(contents: &[&str]) -> Vec<Document> {
        contents
            .iter()
            .map(|c| Document::new(*c, SourceType::Pdf))
            .collect()
    }

    #[tokio::test]
    async fn test_confidence_gate_at_threshold() {
        let model = ScriptedModel::new().with_grades(|_, user| {
            if user.contains("borderline") {
                Ok(scored(true, 0.59))
            } else {
                Ok(scored(true, 0.60))
            }
        });
        let grader = DocumentGrader::new(Arc::new(model), DocumentGradingConfig::default());

        let report = grader
            .grade_documents("q", docs(&["borderline doc", "good doc"]))
            .await;
        assert_eq!(report.kept.len(), 1);
        assert_eq!(report.kept[0].content, "good doc");
        assert!(!report.grades[0].is_relevant);
        assert!(report.grades[1].is_relevant);
    }

    #[tokio::test]
    async fn test_no_label_is_dropped_regardless_of_confidence() {
        let model = ScriptedModel::new().with_grades(|_, _| Ok(scored(false, 1.0)));
        let grader = DocumentGrader::new(Arc::new(model), DocumentGradingConfig::default());
        let report = grader.grade_documents("q", docs(&["a", "b"])).await;
        assert!(report.kept.is_empty());
        assert_eq!(report.grades.len(), 2);
    }

    #[tokio::test]
    async fn test_order_preserved_across_batches() {
        let model = ScriptedModel::new().with_grades(|_, user| {
            Ok(scored(!user.contains("skip"), 0.9))
        });
        let config = DocumentGradingConfig {
            batch_size: 2,
            ..DocumentGradingConfig::default()
        };
        let grader = DocumentGrader::new(Arc::new(model), config);
        let report = grader
            .grade_documents("q", docs(&["d0", "skip1", "d2", "d3", "skip4"]))
            .await;
        let kept: Vec<&str> = report.kept.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(kept, vec!["d0", "d2", "d3"]);
        let indices: Vec<usize> = report.grades.iter().map(|g| g.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_then_fail_closed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = ScriptedModel::new().with_grades(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Connection {
                message: "connection reset by peer".into(),
            })
        });
        let grader = DocumentGrader::new(Arc::new(model), DocumentGradingConfig::default());
        let report = grader.grade_documents("q", docs(&["only"])).await;

        assert!(report.kept.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(report.grades[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_recovers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = ScriptedModel::new().with_grades(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::Timeout { timeout_secs: 30 })
            } else {
                Ok(scored(true, 0.8))
            }
        });
        let grader = DocumentGrader::new(Arc::new(model), DocumentGradingConfig::default());
        let report = grader.grade_documents("q", docs(&["only"])).await;
        assert_eq!(report.kept.len(), 1);
        assert!(report.grades[0].error.is_none());
    }

    #[tokio::test]
    async fn test_parse_error_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = ScriptedModel::new().with_grades(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("not json at all".into())
        });
        let grader = DocumentGrader::new(Arc::new(model), DocumentGradingConfig::default());
        let report = grader.grade_documents("q", docs(&["a"])).await;
        assert!(report.kept.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.grades[0].error.is_some());
    }

    /// Grades every document relevant after a short delay, tracking how
    /// many calls are in flight at once.
    #[derive(Default)]
    struct SlowModel {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn generate(
            &self,
            _role: ModelRole,
            _system_prompt: &str,
            _user_prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, LlmError> {
            Err(LlmError::Disabled)
        }

        async fn grade_structured(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _shape: &OutputShape,
        ) -> Result<String, LlmError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(scored(true, 0.9))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_batch_size() {
        let model = Arc::new(SlowModel::default());
        let grader = DocumentGrader::new(model.clone(), DocumentGradingConfig::default());
        let contents: Vec<String> = (0..10).map(|i| format!("doc {}", i)).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();

        let report = grader.grade_documents("q", docs(&refs)).await;

        assert_eq!(report.kept.len(), 10);
        assert_eq!(model.calls.load(Ordering::SeqCst), 10);
        assert_eq!(model.peak.load(Ordering::SeqCst), 4);
        assert_eq!(model.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_size_one_grades_serially() {
        let model = Arc::new(SlowModel::default());
        let config = DocumentGradingConfig {
            batch_size: 1,
            ..DocumentGradingConfig::default()
        };
        let grader = DocumentGrader::new(model.clone(), config);

        grader.grade_documents("q", docs(&["a", "b", "c"])).await;

        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let grader = DocumentGrader::new(Arc::new(ScriptedModel::new()), DocumentGradingConfig::default());
        let report = grader.grade_documents("q", Vec::new()).await;
        assert!(report.kept.is_empty());
        assert!(report.grades.is_empty());
    }
}
