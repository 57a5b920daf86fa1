use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Open key-value map of generation parameters (temperature, num_ctx, ...).
pub type ModelConfig = HashMap<String, JsonValue>;

/// Read the temperature out of a model config, if the caller set one.
pub fn config_temperature(config: &ModelConfig) -> Option<f64> {
    config.get("temperature").and_then(JsonValue::as_f64)
}

/// Where a retrieved document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Pdf,
    #[serde(rename = "stackoverflow")]
    StackOverflow,
    Collection,
    #[default]
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::StackOverflow => "stackoverflow",
            Self::Collection => "collection",
            Self::Unknown => "unknown",
        }
    }
}

/// Retrieval backend selected for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverType {
    #[default]
    Pdf,
    #[serde(rename = "stackoverflow")]
    StackOverflow,
    MultiSource,
}

impl RetrieverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::StackOverflow => "stackoverflow",
            Self::MultiSource => "multi_source",
        }
    }
}

impl fmt::Display for RetrieverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrieverType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        [Self::Pdf, Self::StackOverflow, Self::MultiSource]
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown retrieval source '{}', expected pdf, stackoverflow or multi_source", s))
    }
}

/// A retrieved document: text, source tag and free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

impl Document {
    pub fn new(content: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            content: content.into(),
            source_type,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(JsonValue::as_str)
    }

    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(JsonValue::as_f64)
    }

    /// First `max_chars` characters, with an ellipsis when truncated.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.content, max_chars)
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Concatenate document contents separated by blank lines.
///
/// Used both for the generator's context and for each hallucination batch so
/// the grader sees exactly the text the answer was generated from.
pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

const PREVIEW_CHARS: usize = 200;

/// Display-oriented summary of a document returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source: String,
    pub title: String,
    pub content_preview: String,
    pub full_content: String,
    pub relevance_score: Option<f64>,
    pub metadata: HashMap<String, JsonValue>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        let metadata_text = serde_json::to_string(&doc.metadata)
            .unwrap_or_default()
            .to_lowercase();

        let source = if doc.source_type == SourceType::StackOverflow
            || metadata_text.contains("stackoverflow")
            || doc.metadata.contains_key("so_question_id")
        {
            "stackoverflow".to_string()
        } else if doc.source_type == SourceType::Pdf
            || doc
                .metadata_str("file_path")
                .map(|p| p.to_lowercase().ends_with(".pdf"))
                .unwrap_or(false)
        {
            "pdf".to_string()
        } else {
            doc.metadata_str("source_type")
                .map(str::to_string)
                .unwrap_or_else(|| doc.source_type.as_str().to_string())
        };

        let title = doc
            .metadata_str("title")
            .or_else(|| doc.metadata_str("question_title"))
            .or_else(|| doc.metadata_str("file_path"))
            .unwrap_or("Unknown")
            .to_string();

        let relevance_score = doc
            .metadata_f64("relevance_score")
            .or_else(|| doc.metadata_f64("score"))
            .or_else(|| doc.metadata_f64("retrieval_score"));

        let metadata = doc
            .metadata
            .iter()
            .filter(|(k, v)| {
                k.as_str() != "page_content"
                    && k.as_str() != "full_content"
                    && !v.is_object()
                    && !v.is_null()
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            source,
            title,
            content_preview: doc.preview(PREVIEW_CHARS),
            full_content: doc.content.clone(),
            relevance_score,
            metadata,
        }
    }
}
