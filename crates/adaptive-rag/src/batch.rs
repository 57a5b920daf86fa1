//! Sequential batch execution of questions across one or more workflows.
//!
//! Items run one after another. A failing item is recorded and the batch
//! continues. Cancellation is checked between items only; an execution that
//! has started always runs to completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{ModelConfig, RetrieverType};
use crate::workflow::{QueryRequest, QueryResult, RagService, Workflow};

/// Questions to run and how to run them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchJob {
    pub questions: Vec<String>,
    /// Empty means adaptive only.
    #[serde(default)]
    pub workflows: Vec<Workflow>,
    #[serde(default)]
    pub collection_ids: Vec<String>,
    #[serde(default)]
    pub retrieval_source: RetrieverType,
    #[serde(default)]
    pub model_config: ModelConfig,
}

impl BatchJob {
    pub fn new(questions: Vec<String>) -> Self {
        Self {
            questions,
            ..Default::default()
        }
    }

    pub fn with_workflows(mut self, workflows: Vec<Workflow>) -> Self {
        self.workflows = workflows;
        self
    }

    fn workflows(&self) -> Vec<Workflow> {
        if self.workflows.is_empty() {
            vec![Workflow::AdaptiveRag]
        } else {
            self.workflows.clone()
        }
    }

    fn request(&self, question: &str) -> QueryRequest {
        QueryRequest {
            question: question.to_string(),
            model_config: self.model_config.clone(),
            collection_ids: self.collection_ids.clone(),
            retrieval_source: self.retrieval_source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed { error_message: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub question: String,
    pub workflow: Workflow,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub result: Option<QueryResult>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    fn record(&mut self, status: &ItemStatus) {
        match status {
            ItemStatus::Success => self.successful += 1,
            ItemStatus::Failed { .. } => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

/// Snapshot handed to the progress callback before and after each item.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress<'a> {
    pub summary: BatchSummary,
    /// Set while an item is running.
    pub current: Option<(&'a str, Workflow)>,
    /// Set once an item has finished.
    pub completed: Option<&'a BatchItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

pub struct BatchRunner<'a> {
    service: &'a RagService,
    cancel: CancellationToken,
}

impl<'a> BatchRunner<'a> {
    pub fn new(service: &'a RagService) -> Self {
        Self {
            service,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the batch before its next item.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run<F>(&self, job: &BatchJob, mut on_progress: F) -> BatchReport
    where
        F: FnMut(&BatchProgress<'_>),
    {
        let job_id = Uuid::new_v4();
        let started_at = Utc::now();
        let workflows = job.workflows();
        let mut summary = BatchSummary {
            total: job.questions.len() * workflows.len(),
            ..Default::default()
        };
        let mut items = Vec::with_capacity(summary.total);

        tracing::info!(
            job_id = %job_id,
            questions = job.questions.len(),
            workflows = workflows.len(),
            total = summary.total,
            "Starting batch"
        );

        let runs = job
            .questions
            .iter()
            .flat_map(|q| workflows.iter().map(move |w| (q.as_str(), *w)));

        for (index, (question, workflow)) in runs.enumerate() {
            let (status, result) = if self.cancel.is_cancelled() {
                (ItemStatus::Skipped, None)
            } else {
                on_progress(&BatchProgress {
                    summary,
                    current: Some((question, workflow)),
                    completed: None,
                });
                match self.service.execute(workflow, job.request(question)).await {
                    Ok(result) => (ItemStatus::Success, Some(result)),
                    Err(e) => {
                        tracing::error!(
                            index,
                            workflow = %workflow,
                            error = %format!("{:#}", e),
                            "Batch item failed"
                        );
                        (
                            ItemStatus::Failed {
                                error_message: format!("{:#}", e),
                            },
                            None,
                        )
                    }
                }
            };

            summary.record(&status);
            let item = BatchItem {
                index,
                question: question.to_string(),
                workflow,
                status,
                result,
                completed_at: Utc::now(),
            };
            if item.status != ItemStatus::Skipped {
                on_progress(&BatchProgress {
                    summary,
                    current: None,
                    completed: Some(&item),
                });
            }
            items.push(item);
        }

        let cancelled = self.cancel.is_cancelled();
        tracing::info!(
            job_id = %job_id,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled,
            "Batch finished"
        );

        BatchReport {
            job_id,
            started_at,
            finished_at: Utc::now(),
            cancelled,
            items,
            summary,
        }
    }
}
