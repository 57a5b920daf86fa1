//! Baseline: answer from the model alone.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use super::machine::Node;
use super::nodes;
use super::outcome::{ExecutionRecorder, QueryRequest, QueryResult};
use super::state::LoopState;
use super::{Components, Workflow};

pub struct PureLlm {
    components: Arc<Components>,
}

impl PureLlm {
    pub fn new(components: Arc<Components>) -> Self {
        Self { components }
    }

    pub async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let c = self.components.as_ref();
        let mut recorder = ExecutionRecorder::new();
        let state = LoopState::new(&request, c.config.generation.default_temperature);

        let t = Instant::now();
        let state = nodes::generate_without_context(c, state).await?;
        recorder.node(Node::Generate, t.elapsed());

        Ok(recorder.finish(Workflow::PureLlm, state, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::llm::ModelRole;
    use crate::prompts;
    use crate::retrieval::RetrievalRouter;
    use crate::testing::ScriptedModel;

    #[tokio::test]
    async fn test_single_generation_with_pure_prompt() {
        let model = Arc::new(ScriptedModel::new());
        let pure = PureLlm::new(Arc::new(Components::new(
            Arc::new(RagConfig::default()),
            model.clone(),
            Arc::new(RetrievalRouter::new(4)),
        )));

        let result = pure
            .run(QueryRequest::new("What is a CTE?").with_temperature(0.7))
            .await
            .unwrap();

        assert_eq!(result.execution_trace, vec!["generate"]);
        assert_eq!(result.iteration_metrics.generation_attempts, 1);
        assert_eq!(result.documents_retrieved, 0);
        assert!(result.iteration_metrics.disclaimer.is_none());

        let calls = model.generate_calls(ModelRole::Chat);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_prompt, prompts::PURE_LLM_SYSTEM);
        assert_eq!(calls[0].temperature, 0.7);
    }
}
