//! Request and result shapes shared by every workflow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use super::machine::Node;
use super::state::{FallbackType, LoopState};
use super::Workflow;
use crate::grading::DocumentGrade;
use crate::types::{DocumentSummary, ModelConfig, RetrieverType};

pub const NO_DOCS_DISCLAIMER: &str =
    "This answer is based on general knowledge, not on documents from the knowledge base.";
pub const MAX_ITERATIONS_DISCLAIMER: &str = "This answer could not be fully verified.";
pub const RELEVANCE_UNCONFIRMED_DISCLAIMER: &str = "This answer may not fully address your question.";

/// Key under which generation assessment time is recorded.
pub const GRADE_GENERATION_TIMING: &str = "grade_generation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub model_config: ModelConfig,
    #[serde(default)]
    pub collection_ids: Vec<String>,
    #[serde(default)]
    pub retrieval_source: RetrieverType,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            model_config: ModelConfig::new(),
            collection_ids: Vec::new(),
            retrieval_source: RetrieverType::default(),
        }
    }

    pub fn with_source(mut self, source: RetrieverType) -> Self {
        self.retrieval_source = source;
        self
    }

    pub fn with_collections(mut self, ids: Vec<String>) -> Self {
        self.collection_ids = ids;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.model_config
            .insert("temperature".to_string(), serde_json::json!(temperature));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub generation_attempts: u32,
    pub transform_attempts: u32,
    pub total_iterations: u32,
    pub max_iterations_reached: bool,
    pub no_relevant_docs_fallback: bool,
    pub relevance_unconfirmed: bool,
    pub disclaimer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub run_id: Uuid,
    pub workflow: Workflow,
    pub answer: String,
    pub documents_retrieved: usize,
    pub rewritten_question: Option<String>,
    pub execution_trace: Vec<String>,
    /// Milliseconds per node, summed over repeated executions
    pub node_timings: BTreeMap<String, f64>,
    pub iteration_metrics: IterationMetrics,
    pub fallback_type: FallbackType,
    pub retrieved_documents: Vec<DocumentSummary>,
    pub document_grades: Vec<DocumentGrade>,
    pub processing_time_ms: u64,
}

/// Disclaimer for the terminal state, if one applies.
pub fn disclaimer_for(state: &LoopState) -> Option<&'static str> {
    if state.no_relevant_docs_fallback {
        Some(NO_DOCS_DISCLAIMER)
    } else if state.max_iterations_reached {
        Some(MAX_ITERATIONS_DISCLAIMER)
    } else if state.relevance_unconfirmed {
        Some(RELEVANCE_UNCONFIRMED_DISCLAIMER)
    } else {
        None
    }
}

/// Collects the execution trace and per-node timings of one run.
#[derive(Debug, Default)]
pub struct ExecutionRecorder {
    trace: Vec<String>,
    timings: BTreeMap<String, f64>,
}

impl ExecutionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&mut self, node: Node, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        tracing::info!(node = node.as_str(), elapsed_ms = ms, "Executed node");
        self.trace.push(node.as_str().to_string());
        self.time(node.as_str(), elapsed);
    }

    /// Time a step that is not a node (not added to the trace).
    pub fn time(&mut self, key: &str, elapsed: Duration) {
        *self.timings.entry(key.to_string()).or_insert(0.0) += elapsed.as_secs_f64() * 1000.0;
    }

    /// Assemble the caller-facing result from the terminal state.
    pub fn finish(self, workflow: Workflow, state: LoopState, elapsed: Duration) -> QueryResult {
        let rewritten_question = if state.question != state.original_question() {
            Some(state.question.clone())
        } else {
            None
        };
        let disclaimer = disclaimer_for(&state).map(str::to_string);
        let retrieved_documents = state.documents.iter().map(DocumentSummary::from).collect();
        let processing_time_ms = elapsed.as_millis() as u64;

        tracing::info!(
            workflow = %workflow,
            path = %self.trace.join(" -> "),
            total_iterations = state.total_iterations,
            generation_attempts = state.generation_attempts,
            transform_attempts = state.transform_attempts,
            fallback = %state.fallback_type,
            processing_time_ms,
            "Query executed"
        );

        QueryResult {
            run_id: Uuid::new_v4(),
            workflow,
            answer: state.generation,
            documents_retrieved: state.documents.len(),
            rewritten_question,
            execution_trace: self.trace,
            node_timings: self.timings,
            iteration_metrics: IterationMetrics {
                generation_attempts: state.generation_attempts,
                transform_attempts: state.transform_attempts,
                total_iterations: state.total_iterations,
                max_iterations_reached: state.max_iterations_reached,
                no_relevant_docs_fallback: state.no_relevant_docs_fallback,
                relevance_unconfirmed: state.relevance_unconfirmed,
                disclaimer,
            },
            fallback_type: state.fallback_type,
            retrieved_documents,
            document_grades: state.document_grades,
            processing_time_ms,
        }
    }
}
