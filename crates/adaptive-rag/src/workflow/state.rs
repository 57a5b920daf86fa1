use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grading::DocumentGrade;
use crate::types::{config_temperature, Document, ModelConfig, RetrieverType};

use super::outcome::QueryRequest;

/// Which fallback path ended the run, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FallbackType {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "max_iterations")]
    MaxIterations,
    #[serde(rename = "no_relevant_docs")]
    NoRelevantDocs,
}

impl FallbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::MaxIterations => "max_iterations",
            Self::NoRelevantDocs => "no_relevant_docs",
        }
    }
}

impl fmt::Display for FallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record threaded through every node of one execution.
///
/// Nodes take the state by value and return the replacement. The original
/// question and the submitted temperature are fixed at construction.
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Text used for retrieval; the rewriter replaces it
    pub question: String,
    original_question: String,
    pub generation: String,
    pub documents: Vec<Document>,
    pub model_config: ModelConfig,
    base_temperature: f64,
    pub collection_ids: Vec<String>,
    pub retrieval_source: RetrieverType,

    pub generation_attempts: u32,
    pub transform_attempts: u32,
    pub total_iterations: u32,

    pub max_iterations_reached: bool,
    pub no_relevant_docs_fallback: bool,
    /// Accepted without confirmation that the answer addresses the question
    pub relevance_unconfirmed: bool,
    pub fallback_type: FallbackType,

    /// Per-document grades from the most recent grading step
    pub document_grades: Vec<DocumentGrade>,
}

impl LoopState {
    pub fn new(request: &QueryRequest, default_temperature: f64) -> Self {
        let base_temperature = config_temperature(&request.model_config).unwrap_or(default_temperature);
        Self {
            question: request.question.clone(),
            original_question: request.question.clone(),
            generation: String::new(),
            documents: Vec::new(),
            model_config: request.model_config.clone(),
            base_temperature,
            collection_ids: request.collection_ids.clone(),
            retrieval_source: request.retrieval_source,
            generation_attempts: 0,
            transform_attempts: 0,
            total_iterations: 0,
            max_iterations_reached: false,
            no_relevant_docs_fallback: false,
            relevance_unconfirmed: false,
            fallback_type: FallbackType::None,
            document_grades: Vec::new(),
        }
    }

    pub fn original_question(&self) -> &str {
        &self.original_question
    }

    /// Temperature the caller submitted (or the configured default).
    pub fn base_temperature(&self) -> f64 {
        self.base_temperature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_state_has_zero_counters() {
        let mut request = QueryRequest::new("How to JOIN two tables in SQL?");
        request.model_config.insert("temperature".into(), json!(0.3));
        let state = LoopState::new(&request, 0.0);

        assert_eq!(state.question, state.original_question());
        assert_eq!(state.base_temperature(), 0.3);
        assert_eq!(state.generation_attempts, 0);
        assert_eq!(state.transform_attempts, 0);
        assert_eq!(state.total_iterations, 0);
        assert_eq!(state.fallback_type, FallbackType::None);
        assert!(state.generation.is_empty());
    }

    #[test]
    fn test_default_temperature_when_unset() {
        let state = LoopState::new(&QueryRequest::new("q"), 0.1);
        assert_eq!(state.base_temperature(), 0.1);
    }

    #[test]
    fn test_fallback_type_serialization() {
        assert_eq!(serde_json::to_string(&FallbackType::None).unwrap(), "\"\"");
        assert_eq!(
            serde_json::to_string(&FallbackType::NoRelevantDocs).unwrap(),
            "\"no_relevant_docs\""
        );
        let parsed: FallbackType = serde_json::from_str("\"max_iterations\"").unwrap();
        assert_eq!(parsed, FallbackType::MaxIterations);
    }
}
