//! Retrieval collaborator contract and source routing.
//!
//! The vector index itself is a black box behind [`Retriever`]. The router
//! picks a backend per query: one query per collection when collection ids are
//! given, otherwise the retriever registered for the requested source.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Document, RetrieverType};

pub mod memory;
pub mod multi_source;

pub use memory::InMemoryRetriever;
pub use multi_source::MultiSourceRetriever;

/// Optional narrowing of a retrieval call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalFilter {
    /// Restrict results to one collection
    pub collection_id: Option<String>,
    /// Backend-specific metadata constraints (exact match)
    pub metadata: HashMap<String, JsonValue>,
}

impl RetrievalFilter {
    pub fn collection(id: impl Into<String>) -> Self {
        Self {
            collection_id: Some(id.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(id) = &self.collection_id {
            if doc.metadata_str("collection_id") != Some(id.as_str()) {
                return false;
            }
        }
        self.metadata
            .iter()
            .all(|(k, v)| doc.metadata.get(k) == Some(v))
    }
}

/// A document source. "No results" is `Ok(vec![])`; hard failures are errors.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize, filter: &RetrievalFilter) -> Result<Vec<Document>>;

    fn name(&self) -> &str;
}

/// Routes a query to the right retriever.
pub struct RetrievalRouter {
    sources: HashMap<RetrieverType, Arc<dyn Retriever>>,
    collections: Option<Arc<dyn Retriever>>,
    k: usize,
}

impl RetrievalRouter {
    pub fn new(k: usize) -> Self {
        Self {
            sources: HashMap::new(),
            collections: None,
            k,
        }
    }

    pub fn with_source(mut self, source: RetrieverType, retriever: Arc<dyn Retriever>) -> Self {
        self.sources.insert(source, retriever);
        self
    }

    pub fn with_collections(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.collections = Some(retriever);
        self
    }

    /// Retrieve for `query`. Per-collection failures are logged and skipped;
    /// a missing source or collection backend is an error.
    pub async fn retrieve(
        &self,
        query: &str,
        collection_ids: &[String],
        source: RetrieverType,
    ) -> Result<Vec<Document>> {
        if !collection_ids.is_empty() {
            let retriever = self
                .collections
                .as_ref()
                .ok_or_else(|| anyhow!("No collection retriever configured"))?;

            tracing::info!(collections = collection_ids.len(), "Retrieving from collections");
            let mut documents = Vec::new();
            for id in collection_ids {
                match retriever
                    .retrieve(query, self.k, &RetrievalFilter::collection(id.clone()))
                    .await
                {
                    Ok(docs) => {
                        tracing::info!(collection = %id, count = docs.len(), "Retrieved from collection");
                        documents.extend(docs);
                    }
                    Err(e) => {
                        tracing::warn!(collection = %id, error = %e, "Failed to retrieve from collection");
                    }
                }
            }
            return Ok(documents);
        }

        let retriever = self
            .sources
            .get(&source)
            .ok_or_else(|| anyhow!("No retriever registered for source '{}'", source))?;

        let documents = retriever
            .retrieve(query, self.k, &RetrievalFilter::default())
            .await?;
        tracing::info!(source = %source, backend = retriever.name(), count = documents.len(), "Retrieved documents");
        Ok(documents)
    }
}
