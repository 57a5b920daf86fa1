//! Prompt catalogue for every language-model call the loop makes.

use std::collections::BTreeMap;

/// Substitute `{name}` placeholders in one pass, so braces inside the
/// inserted values are never expanded.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + vars.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let hit = vars.iter().find_map(|(key, value)| {
            tail.strip_prefix(*key)
                .and_then(|r| r.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Document grading
// ---------------------------------------------------------------------------

pub const DOCUMENT_GRADER_SYSTEM: &str = r#"You are a strict grader assessing whether a retrieved document is truly relevant to answer a user question.

RELEVANCE CRITERIA - A document is ONLY relevant if:
1. It directly addresses the SPECIFIC topic or problem in the question
2. It contains information that would actually help answer the user's EXACT question
3. The content is semantically aligned with the question's intent, not just sharing keywords

REJECTION CRITERIA - Mark as NOT relevant if:
1. The document only shares general keywords (e.g., both mention "SQL" but different topics)
2. The document discusses a related but different concept
3. The document is about a different domain/use-case despite similar terminology

Examples:
- Question: "How to find prime numbers in SQL?" + Document about "Full Text Search in SQL" -> NOT relevant (different topic)
- Question: "How to optimize SQL queries?" + Document about "SQL query performance tuning" -> relevant (same topic)

RESPONSE FORMAT:
- binary_score: 'yes' if relevant, 'no' if not
- confidence: Your confidence in this assessment (0.0 = pure guess, 1.0 = absolutely certain)
- reasoning: Brief explanation of your decision (1-2 sentences)

CONFIDENCE GUIDELINES:
- 1.0: Document is clearly and directly about the exact question topic
- 0.8-0.9: Document is highly relevant with minor tangential content
- 0.6-0.7: Document is somewhat relevant but not a perfect match
- 0.4-0.5: Borderline relevance, could go either way
- 0.1-0.3: Probably not relevant, weak connection
- 0.0: Completely unrelated"#;

const DOCUMENT_GRADER_USER: &str = "Retrieved document:\n\n{document}\n\nUser question: {question}\n\nAssess the document's relevance with binary_score, confidence, and reasoning.";

pub fn document_grader_user(document: &str, question: &str) -> String {
    render(DOCUMENT_GRADER_USER, &[("document", document), ("question", question)])
}

// ---------------------------------------------------------------------------
// Hallucination grading
// ---------------------------------------------------------------------------

pub const HALLUCINATION_GRADER_SYSTEM: &str = r#"You are a grader assessing whether an LLM generation is factually supported by retrieved documents.

GRADING GUIDELINES:
1. Focus on FACTUAL CONTENT, not exact wording
2. If the answer's key information (SQL queries, explanations, solutions) can be traced back to ANY of the provided documents, answer 'yes'
3. Rephrasing, simplification, or reorganization is ACCEPTABLE - not hallucination
4. Only answer 'no' if the generation contains MAJOR claims that have NO basis in the provided documents

Give a binary score 'yes' or 'no'. 'Yes' = answer is factually supported by these documents."#;

const HALLUCINATION_GRADER_USER: &str = "Set of facts: \n\n {documents} \n\n LLM generation: {generation}";

pub fn hallucination_grader_user(documents: &str, generation: &str) -> String {
    render(HALLUCINATION_GRADER_USER, &[("documents", documents), ("generation", generation)])
}

// ---------------------------------------------------------------------------
// Answer grading
// ---------------------------------------------------------------------------

pub const ANSWER_GRADER_SYSTEM: &str = "You are a grader assessing whether an answer addresses / resolves a question.\nGive a binary score 'yes' or 'no'. 'Yes' means that the answer resolves the question.";

const ANSWER_GRADER_USER: &str = "User question: \n\n {question} \n\n LLM generation: {generation}";

pub fn answer_grader_user(question: &str, generation: &str) -> String {
    render(ANSWER_GRADER_USER, &[("question", question), ("generation", generation)])
}

// ---------------------------------------------------------------------------
// Query rewriting
// ---------------------------------------------------------------------------

pub const QUESTION_REWRITER_SYSTEM: &str = r#"You are a question re-writer that reformulates questions for better vectorstore retrieval.

IMPORTANT RULES:
1. Keep the SAME semantic meaning as the original question
2. Only rephrase to improve keyword matching, NOT to change what is being asked
3. Preserve ALL technical terms exactly (e.g., "JSON", "MySQL", "index", "array", "PostgreSQL")
4. Do NOT add assumptions or interpretations beyond what the user asked
5. Do NOT expand the scope of the question
6. The rewritten question should still be answerable by the same type of information

GOOD EXAMPLES:
- Original: "How to index JSON array in MySQL?" -> Rewritten: "MySQL JSON array indexing methods and techniques"
- Original: "What is SQL injection?" -> Rewritten: "SQL injection definition explanation prevention"

BAD EXAMPLES (DO NOT DO THIS):
- Original: "How to index JSON array in MySQL?" -> "What are the best database optimization techniques?" (too broad)
- Original: "SQL query performance" -> "Full-stack application optimization" (different topic)

Output ONLY the rewritten question, nothing else."#;

const QUESTION_REWRITER_USER: &str = "Original question: {question}\n\nRewritten question:";

pub fn question_rewriter_user(question: &str) -> String {
    render(QUESTION_REWRITER_USER, &[("question", question)])
}

// ---------------------------------------------------------------------------
// Answer generation
// ---------------------------------------------------------------------------

pub const ANSWER_GENERATOR_SYSTEM: &str = r#"You are an assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the question.

IMPORTANT:
- Focus on the user's specific question only
- Do NOT answer unrelated questions from the context

Provide a complete answer that includes:
- A clear explanation of the problem/concept
- The solution (code, query, etc.) if applicable
- Any relevant details that help understanding

If you don't know the answer, just say that you don't know."#;

const ANSWER_GENERATOR_USER: &str = "Question: {question} \n\nContext: {context}";

pub fn answer_generator_user(question: &str, context: &str) -> String {
    render(ANSWER_GENERATOR_USER, &[("question", question), ("context", context)])
}

/// Used when no context is available (pure LLM workflow).
pub const PURE_LLM_SYSTEM: &str = r#"You are an assistant for question-answering tasks.
Answer the question to the best of your knowledge based on your training.
If you don't know the answer, just say that you don't know.
Keep the answer concise but informative.
Your answer should include an explanation for the problem and a possible solution when applicable."#;

const PURE_LLM_USER: &str = "Question: {question}";

pub fn pure_llm_user(question: &str) -> String {
    render(PURE_LLM_USER, &[("question", question)])
}

/// Every prompt template keyed by name, for inspection.
pub fn all() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("document_grader_system", DOCUMENT_GRADER_SYSTEM),
        ("document_grader_user", DOCUMENT_GRADER_USER),
        ("hallucination_grader_system", HALLUCINATION_GRADER_SYSTEM),
        ("hallucination_grader_user", HALLUCINATION_GRADER_USER),
        ("answer_grader_system", ANSWER_GRADER_SYSTEM),
        ("answer_grader_user", ANSWER_GRADER_USER),
        ("question_rewriter_system", QUESTION_REWRITER_SYSTEM),
        ("question_rewriter_user", QUESTION_REWRITER_USER),
        ("answer_generator_system", ANSWER_GENERATOR_SYSTEM),
        ("answer_generator_user", ANSWER_GENERATOR_USER),
        ("pure_llm_system", PURE_LLM_SYSTEM),
        ("pure_llm_user", PURE_LLM_USER),
    ])
}
