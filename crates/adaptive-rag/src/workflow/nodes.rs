//! Node handlers. Each takes the current state and returns its replacement.

use anyhow::{Context, Result};
use serde_json::json;

use super::machine::{budget_exhausted, GenerationCheck};
use super::state::{FallbackType, LoopState};
use super::Components;
use crate::generator::escalated_temperature;
use crate::llm::GenerationParams;

fn generation_params(state: &LoopState) -> GenerationParams {
    GenerationParams::from_model_config(&state.model_config, state.base_temperature())
}

/// Fetch documents for the current question. Retrieval errors yield an empty
/// document list.
pub async fn retrieve(c: &Components, mut state: LoopState) -> LoopState {
    state.total_iterations += 1;

    let documents = match c
        .retrieval
        .retrieve(&state.question, &state.collection_ids, state.retrieval_source)
        .await
    {
        Ok(docs) => docs,
        Err(e) => {
            tracing::error!(error = %e, "Error in retrieval, continuing with empty documents");
            Vec::new()
        }
    };

    if documents.is_empty() {
        tracing::warn!(question = %state.question, "No documents retrieved");
    } else {
        tracing::info!(count = documents.len(), "Retrieved documents");
    }
    state.documents = documents;
    state
}

/// Replace the documents with the ones the relevance grader keeps.
pub async fn grade_documents(c: &Components, mut state: LoopState) -> LoopState {
    state.total_iterations += 1;
    let documents = std::mem::take(&mut state.documents);
    let report = c.document_grader.grade_documents(&state.question, documents).await;
    state.documents = report.kept;
    state.document_grades = report.grades;
    state
}

/// Answer the original question from the current documents.
pub async fn generate(c: &Components, mut state: LoopState) -> Result<LoopState> {
    state.generation_attempts += 1;
    state.total_iterations += 1;

    let temperature = escalated_temperature(
        state.base_temperature(),
        state.generation_attempts,
        &c.config.generation,
    );
    if state.generation_attempts > 1 {
        tracing::info!(
            attempt = state.generation_attempts,
            from = state.base_temperature(),
            to = temperature,
            "Escalating generation temperature"
        );
    }
    state
        .model_config
        .insert("temperature".to_string(), json!(temperature));

    let params = generation_params(&state);
    state.generation = c
        .generator
        .generate(state.original_question(), &state.documents, &params)
        .await
        .with_context(|| format!("Generation attempt {} failed", state.generation_attempts))?;

    tracing::info!(
        attempt = state.generation_attempts,
        max = c.config.limits.max_generation_retries,
        "Generation complete"
    );
    Ok(state)
}

/// Answer the original question without any document context.
pub async fn generate_without_context(c: &Components, mut state: LoopState) -> Result<LoopState> {
    state.generation_attempts += 1;
    state.total_iterations += 1;

    let params = generation_params(&state);
    state.generation = c
        .generator
        .generate_without_context(state.original_question(), &params)
        .await
        .context("Generation without context failed")?;
    Ok(state)
}

/// Rewrite the retrieval question.
pub async fn transform_query(c: &Components, mut state: LoopState) -> Result<LoopState> {
    state.transform_attempts += 1;
    state.total_iterations += 1;

    let params = generation_params(&state);
    state.question = c
        .rewriter
        .rewrite(&state.question, &params)
        .await
        .with_context(|| format!("Query rewrite attempt {} failed", state.transform_attempts))?;

    tracing::info!(
        attempt = state.transform_attempts,
        max = c.config.limits.max_transform_retries,
        "Transform complete"
    );
    Ok(state)
}

/// Give up on retrieval and answer from model knowledge.
pub async fn no_docs_fallback(c: &Components, state: LoopState) -> Result<LoopState> {
    tracing::info!("No relevant documents, answering without context");
    let mut state = generate_without_context(c, state).await?;
    state.documents.clear();
    state.no_relevant_docs_fallback = true;
    state.fallback_type = FallbackType::NoRelevantDocs;
    Ok(state)
}

/// Keep the last generation as a best-effort answer.
pub fn fallback(mut state: LoopState) -> LoopState {
    tracing::info!(
        generation_attempts = state.generation_attempts,
        transform_attempts = state.transform_attempts,
        total_iterations = state.total_iterations,
        "Iteration budget reached, returning best-effort answer"
    );
    state.total_iterations += 1;
    state.max_iterations_reached = true;
    state.fallback_type = FallbackType::MaxIterations;
    state
}

/// Assess a fresh generation: budgets first, then grounding, then relevance
/// to the original question.
pub async fn assess_generation(c: &Components, state: &LoopState) -> Result<GenerationCheck> {
    let limits = &c.config.limits;
    if budget_exhausted(state, limits) {
        tracing::info!(
            generation_attempts = state.generation_attempts,
            transform_attempts = state.transform_attempts,
            total_iterations = state.total_iterations,
            "Budget exhausted, skipping generation grading"
        );
        return Ok(GenerationCheck::BudgetExhausted);
    }

    if !c
        .hallucination_grader
        .is_grounded(&state.documents, &state.generation)
        .await
    {
        tracing::info!(attempt = state.generation_attempts, "Generation not grounded in documents");
        return Ok(GenerationCheck::NotGrounded);
    }

    let useful = c
        .answer_grader
        .addresses_question(state.original_question(), &state.generation)
        .await
        .context("Answer grading failed")?;

    Ok(if useful {
        GenerationCheck::Accepted
    } else {
        tracing::info!("Generation grounded but does not address the question");
        GenerationCheck::OffTopic
    })
}
