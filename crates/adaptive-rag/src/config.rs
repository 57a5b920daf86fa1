use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::types::RetrieverType;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RagConfig {
    pub limits: LoopLimits,
    pub document_grading: DocumentGradingConfig,
    pub hallucination: HallucinationConfig,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

/// The three independent iteration budgets of the adaptive loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopLimits {
    pub max_generation_retries: u32,
    pub max_transform_retries: u32,
    pub max_total_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentGradingConfig {
    /// Documents graded concurrently per batch
    pub batch_size: usize,
    pub confidence_threshold: f64,
    /// Total attempts per document on transient transport errors
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HallucinationConfig {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub enable_retry_variation: bool,
    pub retry_temperature_increment: f64,
    /// Temperature used when the caller's model config does not set one
    pub default_temperature: f64,
    pub max_temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub default_source: RetrieverType,
    pub k_per_source: usize,
    pub multi_source_total_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (Ollama serves one under /v1)
    pub base_url: String,
    pub api_key: Option<String>,
    pub models: ModelRoles,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRoles {
    pub chat: String,
    pub grader: String,
    pub rewriter: String,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_generation_retries: 2,
            max_transform_retries: 2,
            max_total_iterations: 15,
        }
    }
}

impl Default for DocumentGradingConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            confidence_threshold: 0.6,
            retry_attempts: 2,
            retry_base_delay_ms: 100,
            retry_backoff_multiplier: 2.0,
        }
    }
}

impl DocumentGradingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_backoff_multiplier,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl Default for HallucinationConfig {
    fn default() -> Self {
        Self { batch_size: 3 }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            enable_retry_variation: true,
            retry_temperature_increment: 0.1,
            default_temperature: 0.0,
            max_temperature: 1.0,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            default_source: RetrieverType::Pdf,
            k_per_source: 3,
            multi_source_total_k: 5,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            models: ModelRoles::default(),
            connect_timeout_secs: 15,
            request_timeout_secs: 300,
            max_tokens: 2048,
        }
    }
}

impl Default for ModelRoles {
    fn default() -> Self {
        Self {
            chat: "gemma3:12b".to_string(),
            grader: "gemma3:12b".to_string(),
            rewriter: "gemma3:12b".to_string(),
        }
    }
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.limits.max_total_iterations == 0 {
            return Err("limits.max_total_iterations must be > 0".into());
        }
        if self.document_grading.batch_size == 0 {
            return Err("document_grading.batch_size must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.document_grading.confidence_threshold) {
            return Err("document_grading.confidence_threshold must be in [0.0, 1.0]".into());
        }
        if self.document_grading.retry_attempts == 0 {
            return Err("document_grading.retry_attempts must be >= 1".into());
        }
        if !(1.0..=10.0).contains(&self.document_grading.retry_backoff_multiplier) {
            return Err("document_grading.retry_backoff_multiplier must be in [1.0, 10.0]".into());
        }
        if self.hallucination.batch_size == 0 {
            return Err("hallucination.batch_size must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.generation.retry_temperature_increment) {
            return Err("generation.retry_temperature_increment must be in [0.0, 1.0]".into());
        }
        if !(0.0..=2.0).contains(&self.generation.max_temperature) {
            return Err("generation.max_temperature must be in [0.0, 2.0]".into());
        }
        if self.retrieval.k == 0 {
            return Err("retrieval.k must be > 0".into());
        }
        if self.llm.base_url.trim().is_empty() {
            return Err("llm.base_url must not be empty".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config the way the binary does: explicit path, then
    /// `RAG_CONFIG`, then `<config dir>/adaptive-rag/config.json`, then defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("RAG_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                dirs::config_dir()
                    .map(|d| d.join("adaptive-rag").join("config.json"))
                    .filter(|p| p.exists())
            });

        let mut config = match path {
            Some(p) => {
                tracing::info!(path = %p.display(), "Loading configuration");
                Self::from_file(&p)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `RAG_*` overrides from the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RAG_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup("RAG_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("RAG_CHAT_MODEL") {
            self.llm.models.chat = model;
        }
        if let Some(model) = lookup("RAG_GRADER_MODEL") {
            self.llm.models.grader = model;
        }
        if let Some(model) = lookup("RAG_REWRITER_MODEL") {
            self.llm.models.rewriter = model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.limits.max_generation_retries, 2);
        assert_eq!(config.limits.max_transform_retries, 2);
        assert_eq!(config.limits.max_total_iterations, 15);
        assert_eq!(config.document_grading.batch_size, 4);
        assert_eq!(config.document_grading.confidence_threshold, 0.6);
        assert_eq!(config.document_grading.retry_attempts, 2);
        assert_eq!(config.hallucination.batch_size, 3);
        assert!(config.generation.enable_retry_variation);
        assert_eq!(config.generation.retry_temperature_increment, 0.1);
        assert_eq!(config.retrieval.k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"limits":{"max_transform_retries":1},"retrieval":{"default_source":"stackoverflow"}}"#)
                .unwrap();
        assert_eq!(config.limits.max_transform_retries, 1);
        assert_eq!(config.limits.max_generation_retries, 2);
        assert_eq!(config.retrieval.default_source, RetrieverType::StackOverflow);
        assert_eq!(config.retrieval.k, 4);
    }

    #[test]
    fn test_validate_rejects_broken_values() {
        let mut config = RagConfig::default();
        config.document_grading.batch_size = 0;
        assert!(config.validate().unwrap_err().contains("batch_size"));

        let mut config = RagConfig::default();
        config.document_grading.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.limits.max_total_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.document_grading.retry_backoff_multiplier = 1e300;
        assert!(config
            .validate()
            .unwrap_err()
            .contains("retry_backoff_multiplier"));

        let mut config = RagConfig::default();
        config.llm.base_url = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RAG_LLM_BASE_URL", "http://gpu-box:8000/v1"),
            ("RAG_GRADER_MODEL", "qwen2.5:7b"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.llm.base_url, "http://gpu-box:8000/v1");
        assert_eq!(config.llm.models.grader, "qwen2.5:7b");
        assert_eq!(config.llm.models.chat, "gemma3:12b");
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_retry_policy_from_grading_config() {
        let policy = DocumentGradingConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }
}
