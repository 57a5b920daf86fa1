//! Driver for the adaptive loop.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use super::machine::{self, Node, NodeResult, Transition};
use super::nodes;
use super::outcome::{ExecutionRecorder, QueryRequest, QueryResult, GRADE_GENERATION_TIMING};
use super::state::LoopState;
use super::{Components, Workflow};

pub struct AdaptiveRag {
    components: Arc<Components>,
}

impl AdaptiveRag {
    pub fn new(components: Arc<Components>) -> Self {
        Self { components }
    }

    /// Run the loop to a terminal node.
    ///
    /// Budget exhaustion and missing documents end in a fallback answer, not
    /// an error. Errors are generation, rewriting or answer-grading failures.
    pub async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let c = self.components.as_ref();
        let limits = c.config.limits;

        let mut state = LoopState::new(&request, c.config.generation.default_temperature);
        let mut recorder = ExecutionRecorder::new();
        let mut node = Node::Retrieve;

        loop {
            let node_started = Instant::now();
            state = match node {
                Node::Retrieve => nodes::retrieve(c, state).await,
                Node::GradeDocuments => nodes::grade_documents(c, state).await,
                Node::Generate => nodes::generate(c, state).await?,
                Node::TransformQuery => nodes::transform_query(c, state).await?,
                Node::NoDocsFallback => nodes::no_docs_fallback(c, state).await?,
                Node::Fallback => nodes::fallback(state),
            };
            recorder.node(node, node_started.elapsed());

            let result = if node == Node::Generate {
                let grading_started = Instant::now();
                let check = nodes::assess_generation(c, &state).await?;
                recorder.time(GRADE_GENERATION_TIMING, grading_started.elapsed());
                NodeResult::Generated(check)
            } else {
                NodeResult::Completed
            };

            let transition = machine::next(node, result, &state, &limits);
            tracing::info!(
                from = node.as_str(),
                to = ?transition,
                total_iterations = state.total_iterations,
                "Routing decision"
            );

            match transition {
                Transition::To(next) => node = next,
                Transition::End => break,
                Transition::EndUnconfirmed => {
                    state.relevance_unconfirmed = true;
                    break;
                }
            }
        }

        Ok(recorder.finish(Workflow::AdaptiveRag, state, started.elapsed()))
    }
}
