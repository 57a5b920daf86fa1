//! Grading primitive shared by every grader.
//!
//! A grader sends a system/user prompt pair to the grader model, constrained
//! to a verdict shape, and parses the reply strictly. Malformed output is a
//! [`LlmError::ResponseParse`]; there is no retry and no default verdict here.
//! Callers own the policy for errors (fail-closed, skip, propagate).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::{LanguageModel, LlmError, OutputShape};

pub mod answer;
pub mod document;
pub mod hallucination;

pub use answer::AnswerGrader;
pub use document::{DocumentGrade, DocumentGrader, GradingReport};
pub use hallucination::HallucinationGrader;

/// Binary label of a verdict. Accepts "yes"/"no" in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BinaryScore {
    Yes,
    No,
}

impl BinaryScore {
    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }
}

impl TryFrom<String> for BinaryScore {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            other => Err(format!("binary_score must be 'yes' or 'no', got '{}'", other)),
        }
    }
}

impl From<BinaryScore> for String {
    fn from(score: BinaryScore) -> Self {
        match score {
            BinaryScore::Yes => "yes".to_string(),
            BinaryScore::No => "no".to_string(),
        }
    }
}

/// Binary-only verdict (hallucination and answer grading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryVerdict {
    pub binary_score: BinaryScore,
}

/// Binary verdict with confidence and a short justification (document grading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVerdict {
    pub binary_score: BinaryScore,
    pub confidence: f64,
    pub reasoning: String,
}

/// A typed verdict the grader model must produce.
pub trait Verdict: DeserializeOwned + Send {
    fn shape() -> OutputShape;

    /// Semantic checks beyond deserialisation.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Verdict for BinaryVerdict {
    fn shape() -> OutputShape {
        OutputShape {
            name: "binary_verdict",
            schema: json!({
                "type": "object",
                "properties": {
                    "binary_score": {"type": "string", "enum": ["yes", "no"]}
                },
                "required": ["binary_score"],
                "additionalProperties": false
            }),
        }
    }
}

impl Verdict for ScoredVerdict {
    fn shape() -> OutputShape {
        OutputShape {
            name: "scored_verdict",
            schema: json!({
                "type": "object",
                "properties": {
                    "binary_score": {"type": "string", "enum": ["yes", "no"]},
                    "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "reasoning": {"type": "string"}
                },
                "required": ["binary_score", "confidence", "reasoning"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence must be in [0, 1], got {}", self.confidence));
        }
        Ok(())
    }
}

/// Ask the grader model for a verdict of type `V`.
pub async fn grade<V: Verdict>(
    llm: &dyn LanguageModel,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<V, LlmError> {
    let shape = V::shape();
    let raw = llm.grade_structured(system_prompt, user_prompt, &shape).await?;
    parse_verdict(&raw, shape.name)
}

/// Parse a verdict out of raw model text, tolerating markdown fences and
/// surrounding prose but nothing else.
pub fn parse_verdict<V: Verdict>(raw: &str, shape_name: &str) -> Result<V, LlmError> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    let verdict: V = serde_json::from_str(json_str).map_err(|e| {
        let preview: String = raw.chars().take(200).collect();
        LlmError::parse(format!(
            "Malformed {} from grader: {} (output: {})",
            shape_name, e, preview
        ))
    })?;

    verdict
        .validate()
        .map_err(|e| LlmError::parse(format!("Invalid {}: {}", shape_name, e)))?;

    Ok(verdict)
}
