//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::llm::{GenerationParams, LanguageModel, LlmError, ModelRole, OutputShape};
use crate::prompts;
use crate::retrieval::{RetrievalFilter, Retriever};
use crate::types::Document;

/// Which grader a structured call came from, recognised by its system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeKind {
    Document,
    Hallucination,
    Answer,
    Other,
}

impl GradeKind {
    fn of(system_prompt: &str) -> Self {
        if system_prompt == prompts::DOCUMENT_GRADER_SYSTEM {
            Self::Document
        } else if system_prompt == prompts::HALLUCINATION_GRADER_SYSTEM {
            Self::Hallucination
        } else if system_prompt == prompts::ANSWER_GRADER_SYSTEM {
            Self::Answer
        } else {
            Self::Other
        }
    }
}

/// Raw grader reply for a binary verdict.
pub fn binary(yes: bool) -> String {
    json!({"binary_score": if yes { "yes" } else { "no" }}).to_string()
}

/// Raw grader reply for a scored verdict.
pub fn scored(yes: bool, confidence: f64) -> String {
    json!({
        "binary_score": if yes { "yes" } else { "no" },
        "confidence": confidence,
        "reasoning": "scripted"
    })
    .to_string()
}

type GradeScript = dyn Fn(GradeKind, &str) -> Result<String, LlmError> + Send + Sync;
type GenerateScript = dyn Fn(ModelRole, &str, &GenerationParams) -> Result<String, LlmError> + Send + Sync;

#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub role: ModelRole,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f64,
}

/// Language model whose replies come from closures. Records every call.
pub struct ScriptedModel {
    grade_script: Box<GradeScript>,
    generate_script: Box<GenerateScript>,
    grades: Mutex<Vec<(GradeKind, String)>>,
    shapes: Mutex<Vec<String>>,
    generations: Mutex<Vec<GenerateCall>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// Every grader says yes with confidence 0.9; chat answers "generated answer",
    /// the rewriter answers "rewritten question".
    pub fn new() -> Self {
        Self {
            grade_script: Box::new(|_, _| Ok(scored(true, 0.9))),
            generate_script: Box::new(|role, _, _| {
                Ok(match role {
                    ModelRole::Rewriter => "rewritten question".to_string(),
                    _ => "generated answer".to_string(),
                })
            }),
            grades: Mutex::new(Vec::new()),
            shapes: Mutex::new(Vec::new()),
            generations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_grades<F>(mut self, script: F) -> Self
    where
        F: Fn(GradeKind, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.grade_script = Box::new(script);
        self
    }

    pub fn with_generation<F>(mut self, script: F) -> Self
    where
        F: Fn(ModelRole, &str, &GenerationParams) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.generate_script = Box::new(script);
        self
    }

    pub fn grade_calls(&self, kind: GradeKind) -> usize {
        self.grades.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn grade_prompts(&self, kind: GradeKind) -> Vec<String> {
        self.grades
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn shapes_seen(&self) -> Vec<String> {
        self.shapes.lock().clone()
    }

    pub fn generate_calls(&self, role: ModelRole) -> Vec<GenerateCall> {
        self.generations
            .lock()
            .iter()
            .filter(|c| c.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(
        &self,
        role: ModelRole,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        self.generations.lock().push(GenerateCall {
            role,
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            temperature: params.temperature,
        });
        (self.generate_script)(role, user_prompt, params)
    }

    async fn grade_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        shape: &OutputShape,
    ) -> Result<String, LlmError> {
        let kind = GradeKind::of(system_prompt);
        self.grades.lock().push((kind, user_prompt.to_string()));
        self.shapes.lock().push(shape.name.to_string());
        (self.grade_script)(kind, user_prompt)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

type RetrieveScript = dyn Fn(usize, &str, &RetrievalFilter) -> anyhow::Result<Vec<Document>> + Send + Sync;

/// Retriever whose results come from a closure of (call index, query, filter).
pub struct ScriptedRetriever {
    script: Box<RetrieveScript>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &str, &RetrievalFilter) -> anyhow::Result<Vec<Document>> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Always returns the same documents.
    pub fn fixed(documents: Vec<Document>) -> Self {
        Self::new(move |_, _, _| Ok(documents.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn retrieve(&self, query: &str, k: usize, filter: &RetrievalFilter) -> anyhow::Result<Vec<Document>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.to_string());
        let mut docs = (self.script)(call, query, filter)?;
        docs.truncate(k);
        Ok(docs)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
