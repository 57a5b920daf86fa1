//! In-memory document corpus with term-overlap scoring.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use super::{RetrievalFilter, Retriever};
use crate::types::{Document, SourceType};

static TERM_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[\p{L}\p{N}_]+").expect("term regex is valid"));

fn terms(text: &str) -> HashSet<String> {
    TERM_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() > 1)
        .collect()
}

pub struct InMemoryRetriever {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl InMemoryRetriever {
    pub fn new(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(documents),
        }
    }

    /// Load a JSON array of documents.
    pub fn from_json_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus {}", path.display()))?;
        let documents: Vec<Document> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse corpus {}", path.display()))?;
        tracing::info!(path = %path.display(), documents = documents.len(), "Loaded corpus");
        Ok(Self::new(name, documents))
    }

    /// A new retriever over the documents of one source type.
    pub fn subset(&self, name: impl Into<String>, source: SourceType) -> Self {
        let documents = self
            .documents
            .read()
            .iter()
            .filter(|d| d.source_type == source)
            .cloned()
            .collect();
        Self::new(name, documents)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Fraction of query terms present in each matching document, best first.
    pub fn search(&self, query: &str, k: usize, filter: &RetrievalFilter) -> Vec<Document> {
        let query_terms = terms(query);
        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let documents = self.documents.read();
        let mut scored: Vec<(f64, &Document)> = documents
            .iter()
            .filter(|d| filter.matches(d))
            .filter_map(|d| {
                let doc_terms = terms(&d.content);
                let overlap = query_terms.intersection(&doc_terms).count();
                if overlap == 0 {
                    None
                } else {
                    Some((overlap as f64 / query_terms.len() as f64, d))
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(score, d)| {
                let mut doc = d.clone();
                doc.metadata.insert("score".to_string(), json!(score));
                doc
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, k: usize, filter: &RetrievalFilter) -> Result<Vec<Document>> {
        Ok(self.search(query, k, filter))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
