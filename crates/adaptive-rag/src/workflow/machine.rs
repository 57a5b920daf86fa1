//! Nodes and pure transition rules of the adaptive loop.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::LoopState;
use crate::config::LoopLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Retrieve,
    GradeDocuments,
    Generate,
    TransformQuery,
    NoDocsFallback,
    Fallback,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieve => "retrieve",
            Self::GradeDocuments => "grade_documents",
            Self::Generate => "generate",
            Self::TransformQuery => "transform_query",
            Self::NoDocsFallback => "no_docs_fallback",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(Node),
    /// Normal completion
    End,
    /// Completion with an answer the answer grader rejected
    EndUnconfirmed,
}

/// Assessment of a fresh generation, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationCheck {
    BudgetExhausted,
    NotGrounded,
    OffTopic,
    Accepted,
}

/// What a node produced, as far as routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeResult {
    Completed,
    Generated(GenerationCheck),
}

/// Any of the three iteration budgets is spent.
pub fn budget_exhausted(state: &LoopState, limits: &LoopLimits) -> bool {
    state.generation_attempts >= limits.max_generation_retries
        || state.transform_attempts >= limits.max_transform_retries
        || state.total_iterations >= limits.max_total_iterations
}

/// Route after document grading.
pub fn decide_to_generate(state: &LoopState, limits: &LoopLimits) -> Node {
    if !state.documents.is_empty() {
        return Node::Generate;
    }
    if state.total_iterations >= limits.max_total_iterations {
        return Node::NoDocsFallback;
    }
    if state.transform_attempts < limits.max_transform_retries {
        Node::TransformQuery
    } else {
        Node::NoDocsFallback
    }
}

/// Route after a generation has been assessed.
pub fn route_generation(check: GenerationCheck, state: &LoopState, limits: &LoopLimits) -> Transition {
    match check {
        GenerationCheck::BudgetExhausted => Transition::To(Node::Fallback),
        GenerationCheck::NotGrounded => {
            if state.generation_attempts >= limits.max_generation_retries {
                Transition::To(Node::Fallback)
            } else {
                Transition::To(Node::Generate)
            }
        }
        GenerationCheck::Accepted => Transition::End,
        GenerationCheck::OffTopic => {
            if state.transform_attempts >= limits.max_transform_retries {
                Transition::EndUnconfirmed
            } else {
                Transition::To(Node::TransformQuery)
            }
        }
    }
}

/// The transition function of the adaptive loop.
pub fn next(node: Node, result: NodeResult, state: &LoopState, limits: &LoopLimits) -> Transition {
    match (node, result) {
        (Node::Retrieve, _) => Transition::To(Node::GradeDocuments),
        (Node::GradeDocuments, _) => Transition::To(decide_to_generate(state, limits)),
        (Node::TransformQuery, _) => Transition::To(Node::Retrieve),
        (Node::Generate, NodeResult::Generated(check)) => route_generation(check, state, limits),
        (Node::Generate, NodeResult::Completed) => Transition::End,
        (Node::NoDocsFallback, _) | (Node::Fallback, _) => Transition::End,
    }
}
