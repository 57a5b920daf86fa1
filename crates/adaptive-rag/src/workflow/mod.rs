//! Question-answering workflows.
//!
//! [`AdaptiveRag`] is the graded, self-correcting loop. [`LinearRag`] and
//! [`PureLlm`] are baselines that share its nodes and result shape.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::generator::Generator;
use crate::grading::{AnswerGrader, DocumentGrader, HallucinationGrader};
use crate::llm::LanguageModel;
use crate::retrieval::RetrievalRouter;
use crate::rewriter::QueryRewriter;

pub mod adaptive;
pub mod linear;
pub mod machine;
pub mod nodes;
pub mod outcome;
pub mod pure_llm;
pub mod state;

pub use adaptive::AdaptiveRag;
pub use linear::LinearRag;
pub use machine::{GenerationCheck, Node, Transition};
pub use outcome::{IterationMetrics, QueryRequest, QueryResult};
pub use pure_llm::PureLlm;
pub use state::{FallbackType, LoopState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    #[default]
    AdaptiveRag,
    SimpleRag,
    PureLlm,
}

impl Workflow {
    pub const ALL: [Workflow; 3] = [Self::AdaptiveRag, Self::SimpleRag, Self::PureLlm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdaptiveRag => "adaptive_rag",
            Self::SimpleRag => "simple_rag",
            Self::PureLlm => "pure_llm",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Workflow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown workflow '{}', expected adaptive_rag, simple_rag or pure_llm", s))
    }
}

/// Collaborators shared by all workflows, built once and reused.
pub struct Components {
    pub config: Arc<RagConfig>,
    pub retrieval: Arc<RetrievalRouter>,
    pub document_grader: DocumentGrader,
    pub hallucination_grader: HallucinationGrader,
    pub answer_grader: AnswerGrader,
    pub rewriter: QueryRewriter,
    pub generator: Generator,
}

impl Components {
    pub fn new(config: Arc<RagConfig>, llm: Arc<dyn LanguageModel>, retrieval: Arc<RetrievalRouter>) -> Self {
        Self {
            document_grader: DocumentGrader::new(llm.clone(), config.document_grading.clone()),
            hallucination_grader: HallucinationGrader::new(llm.clone(), config.hallucination.clone()),
            answer_grader: AnswerGrader::new(llm.clone()),
            rewriter: QueryRewriter::new(llm.clone()),
            generator: Generator::new(llm),
            retrieval,
            config,
        }
    }
}

/// Entry point that runs any workflow over one set of components.
pub struct RagService {
    adaptive: AdaptiveRag,
    linear: LinearRag,
    pure: PureLlm,
}

impl RagService {
    pub fn new(config: RagConfig, llm: Arc<dyn LanguageModel>, retrieval: Arc<RetrievalRouter>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        tracing::info!(llm = llm.name(), "Creating RAG service");
        let components = Arc::new(Components::new(Arc::new(config), llm, retrieval));
        Ok(Self {
            adaptive: AdaptiveRag::new(components.clone()),
            linear: LinearRag::new(components.clone()),
            pure: PureLlm::new(components),
        })
    }

    pub async fn execute(&self, workflow: Workflow, request: QueryRequest) -> Result<QueryResult> {
        tracing::info!(workflow = %workflow, question = %request.question, "Executing query");
        match workflow {
            Workflow::AdaptiveRag => self.adaptive.run(request).await,
            Workflow::SimpleRag => self.linear.run(request).await,
            Workflow::PureLlm => self.pure.run(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedModel, ScriptedRetriever};
    use crate::types::{Document, RetrieverType, SourceType};

    #[test]
    fn test_workflow_names_round_trip() {
        for w in Workflow::ALL {
            assert_eq!(w.as_str().parse::<Workflow>().unwrap(), w);
        }
        assert!("graph".parse::<Workflow>().is_err());
    }

    #[test]
    fn test_service_rejects_invalid_config() {
        let mut config = RagConfig::default();
        config.hallucination.batch_size = 0;
        let result = RagService::new(
            config,
            Arc::new(ScriptedModel::new()),
            Arc::new(RetrievalRouter::new(4)),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_service_dispatches_workflows() {
        let retriever = Arc::new(ScriptedRetriever::fixed(vec![Document::new("JOIN docs", SourceType::Pdf)]));
        let router = Arc::new(RetrievalRouter::new(4).with_source(RetrieverType::Pdf, retriever.clone()));
        let service = RagService::new(RagConfig::default(), Arc::new(ScriptedModel::new()), router).unwrap();

        let result = service
            .execute(Workflow::PureLlm, QueryRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(result.workflow, Workflow::PureLlm);
        assert_eq!(retriever.calls(), 0);

        let result = service
            .execute(Workflow::SimpleRag, QueryRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(result.execution_trace, vec!["retrieve", "generate"]);

        let result = service
            .execute(Workflow::AdaptiveRag, QueryRequest::new("q"))
            .await
            .unwrap();
        assert_eq!(result.execution_trace, vec!["retrieve", "grade_documents", "generate"]);
    }
}
