//! Adaptive retrieval-augmented question answering.
//!
//! A bounded control loop retrieves documents, grades them for relevance,
//! generates an answer, checks it for grounding and relevance, and rewrites
//! the question or falls back when the checks fail.

pub mod batch;
pub mod config;
pub mod generator;
pub mod grading;
pub mod llm;
pub mod prompts;
pub mod retrieval;
pub mod retry;
pub mod rewriter;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use batch::{BatchJob, BatchReport, BatchRunner, BatchSummary, ItemStatus};
pub use config::RagConfig;
pub use types::{Document, DocumentSummary, ModelConfig, RetrieverType, SourceType};
pub use workflow::{FallbackType, QueryRequest, QueryResult, RagService, Workflow};

// Re-export collaborator contracts
pub use llm::{ExternalModel, LanguageModel, LlmError, ModelRole};
pub use retrieval::{InMemoryRetriever, MultiSourceRetriever, RetrievalFilter, RetrievalRouter, Retriever};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
