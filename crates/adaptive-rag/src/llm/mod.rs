//! Language model collaborator
//!
//! The loop talks to language models through [`LanguageModel`]: free-text
//! generation for answers and rewrites, and structured grading that returns
//! the raw model output for the grading primitive to parse.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{config_temperature, ModelConfig};

pub mod external;

pub use external::ExternalModel;

/// Which configured model a call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Chat,
    Grader,
    Rewriter,
}

/// Errors from the language model collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response parse error: {message}")]
    ResponseParse { message: String },

    #[error("LLM is disabled or not initialized")]
    Disabled,
}

impl LlmError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ResponseParse {
            message: message.into(),
        }
    }

    /// Transport-level failures worth retrying (connection reset, timeout,
    /// rate limiting, upstream 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::ResponseParse { .. } | Self::Disabled => false,
        }
    }
}

/// Sampling parameters for one free-text call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: Option<usize>,
    /// Remaining caller-supplied options, passed through to the provider
    #[serde(default)]
    pub extra: ModelConfig,
}

impl GenerationParams {
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature,
            max_tokens: None,
            extra: ModelConfig::new(),
        }
    }

    /// Split a model config into typed parameters plus pass-through options.
    pub fn from_model_config(config: &ModelConfig, default_temperature: f64) -> Self {
        let temperature = config_temperature(config).unwrap_or(default_temperature);
        let max_tokens = config
            .get("max_tokens")
            .and_then(JsonValue::as_u64)
            .map(|v| v as usize);
        let extra = config
            .iter()
            .filter(|(k, _)| k.as_str() != "temperature" && k.as_str() != "max_tokens")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            temperature,
            max_tokens,
            extra,
        }
    }
}

/// Output contract for a structured grading call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputShape {
    pub name: &'static str,
    pub schema: JsonValue,
}

/// Core trait for language model backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion.
    async fn generate(
        &self,
        role: ModelRole,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError>;

    /// Grading call constrained to `shape`; returns the raw model text.
    /// The grading primitive owns parsing so a malformed verdict is always a
    /// loud [`LlmError::ResponseParse`].
    async fn grade_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        shape: &OutputShape,
    ) -> Result<String, LlmError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}
