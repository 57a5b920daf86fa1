//! Baseline: retrieve, then generate. No grading, no retries.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use super::machine::Node;
use super::nodes;
use super::outcome::{ExecutionRecorder, QueryRequest, QueryResult};
use super::state::LoopState;
use super::{Components, Workflow};

pub struct LinearRag {
    components: Arc<Components>,
}

impl LinearRag {
    pub fn new(components: Arc<Components>) -> Self {
        Self { components }
    }

    pub async fn run(&self, request: QueryRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let c = self.components.as_ref();
        let mut recorder = ExecutionRecorder::new();
        let state = LoopState::new(&request, c.config.generation.default_temperature);

        let t = Instant::now();
        let state = nodes::retrieve(c, state).await;
        recorder.node(Node::Retrieve, t.elapsed());

        let t = Instant::now();
        let state = nodes::generate(c, state).await?;
        recorder.node(Node::Generate, t.elapsed());

        Ok(recorder.finish(Workflow::SimpleRag, state, started.elapsed()))
    }
}
