//! Retrieval across several sources with credibility ranking.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::{RetrievalFilter, Retriever};
use crate::types::{Document, RetrieverType, SourceType};

pub struct MultiSourceRetriever {
    sources: Vec<(RetrieverType, Arc<dyn Retriever>)>,
    k_per_source: usize,
    total_k: usize,
}

impl MultiSourceRetriever {
    pub fn new(sources: Vec<(RetrieverType, Arc<dyn Retriever>)>, k_per_source: usize, total_k: usize) -> Self {
        Self {
            sources,
            k_per_source,
            total_k,
        }
    }

    /// Query every source, drop duplicate StackOverflow questions, rank and
    /// keep the best `total_k`.
    pub async fn retrieve_multi_source(&self, query: &str, filter: &RetrievalFilter) -> Vec<Document> {
        let mut all = Vec::new();
        let mut seen_questions = HashSet::new();

        for (source, retriever) in &self.sources {
            match retriever.retrieve(query, self.k_per_source, filter).await {
                Ok(docs) => {
                    let before = all.len();
                    for doc in docs {
                        if let Some(qid) = question_id(&doc) {
                            if !seen_questions.insert(qid) {
                                continue;
                            }
                        }
                        all.push(doc);
                    }
                    tracing::info!(source = %source, count = all.len() - before, "Retrieved from source");
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Error retrieving from source");
                }
            }
        }

        let mut ranked = rank_documents(all, self.total_k);
        let breakdown = source_breakdown(&ranked);
        tracing::info!(total = ranked.len(), breakdown = ?breakdown, "Multi-source retrieval complete");

        if let Some(first) = ranked.first_mut() {
            first
                .metadata
                .entry("multi_source_breakdown".to_string())
                .or_insert_with(|| json!(breakdown));
        }
        ranked
    }
}

#[async_trait]
impl Retriever for MultiSourceRetriever {
    /// Per-source and total limits are fixed at construction; `k` is ignored.
    async fn retrieve(&self, query: &str, _k: usize, filter: &RetrievalFilter) -> Result<Vec<Document>> {
        Ok(self.retrieve_multi_source(query, filter).await)
    }

    fn name(&self) -> &str {
        "multi_source"
    }
}

fn question_id(doc: &Document) -> Option<String> {
    if !is_stackoverflow(doc) {
        return None;
    }
    match doc.metadata.get("question_id")? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn source_tag(doc: &Document) -> String {
    doc.metadata_str("source")
        .map(str::to_lowercase)
        .unwrap_or_else(|| doc.source_type.as_str().to_string())
}

fn is_stackoverflow(doc: &Document) -> bool {
    doc.source_type == SourceType::StackOverflow || source_tag(doc) == "stackoverflow"
}

/// Credibility score in [0, 1].
pub fn credibility_score(doc: &Document) -> f64 {
    let mut score = 0.5;

    if is_stackoverflow(doc) {
        let question_score = doc.metadata_f64("question_score").unwrap_or(0.0);
        let answer_score = doc.metadata_f64("answer_score").unwrap_or(0.0);
        let accepted = doc
            .metadata
            .get("is_accepted_answer")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        score += (question_score * 0.1).min(0.3);
        score += (answer_score * 0.1).min(0.2);
        if accepted {
            score += 0.3;
        }
    } else if doc.source_type == SourceType::Pdf || source_tag(doc).contains("pdf") {
        score += 0.2;
    } else {
        score += 0.1;
    }

    let length = doc.content.chars().count();
    if length > 500 {
        score += 0.1;
    }
    if length > 1500 {
        score += 0.1;
    }

    score.min(1.0)
}

fn rank_documents(documents: Vec<Document>, total_k: usize) -> Vec<Document> {
    let mut scored: Vec<(Document, f64)> = documents
        .into_iter()
        .map(|d| {
            let s = credibility_score(&d);
            (d, s)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(total_k)
        .map(|(mut doc, score)| {
            let rounded = (score * 1000.0).round() / 1000.0;
            doc.metadata.insert("retrieval_score".to_string(), json!(rounded));
            doc
        })
        .collect()
}

fn source_breakdown(documents: &[Document]) -> BTreeMap<String, usize> {
    let mut breakdown = BTreeMap::new();
    for doc in documents {
        let tag = source_tag(doc);
        let key = if tag.contains("stackoverflow") {
            "stackoverflow".to_string()
        } else if tag.contains("pdf") {
            "pdf".to_string()
        } else {
            tag
        };
        *breakdown.entry(key).or_insert(0) += 1;
    }
    breakdown
}
