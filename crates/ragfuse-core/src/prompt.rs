//! Prompt assembly for the completion backend.

use std::collections::BTreeSet;

use crate::models::Document;
use crate::schema::truncate_chars;

/// Separator placed between documents in the fused context.
pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// One block per document, in ranked order.
pub fn build_context(documents: &[Document], content_limit: usize) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "Document {} [{} - {}] (Relevance: {}):\nTitle: {}\nContent: {}",
                i + 1,
                or_unknown(&doc.collection),
                or_unknown(&doc.source_type),
                doc.score,
                doc.title,
                truncate_chars(&doc.content, content_limit)
            )
        })
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "unknown"
    } else {
        s
    }
}

/// Comma-separated, sorted list of collections present in the context.
pub fn collections_present(documents: &[Document]) -> String {
    let names: BTreeSet<&str> = documents
        .iter()
        .map(|d| d.collection.as_str())
        .filter(|c| !c.is_empty())
        .collect();
    if names.is_empty() {
        "unknown".to_string()
    } else {
        names.into_iter().collect::<Vec<_>>().join(", ")
    }
}

/// Full prompt: context, question, answering rules and the confidence
/// marker the model must end with.
pub fn build_prompt(
    question: &str,
    documents: &[Document],
    marker: &str,
    content_limit: usize,
) -> String {
    format!(
        "You are a technical analyst answering questions from an internal knowledge base. \
Use the retrieved context below, which comes from several independent sources.

CONTEXT SOURCES: {sources}

RETRIEVED CONTEXT ({count} documents):
{context}

QUESTION: {question}

INSTRUCTIONS:
- Answer directly, without preambles such as \"Based on the context\".
- Combine evidence across sources and cite identifiers, file paths and titles where they help.
- If the context is incomplete, say what is missing and separate it from general knowledge.

After the answer, on its own line, rate how confident you are that the answer is correct:
{marker}: <score from 0.0 to 1.0>

ANSWER:",
        sources = collections_present(documents),
        count = documents.len(),
        context = build_context(documents, content_limit),
        question = question,
        marker = marker,
    )
}
