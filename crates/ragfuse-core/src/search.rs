//! Single-collection retrieval.
//!
//! [`semantic_search`] runs an L2 nearest-neighbour search and converts
//! distances into relevance scores. [`hybrid_search`] tries the exact-match
//! lookup first and only falls back to similarity search when it finds
//! nothing.

use anyhow::Result;

use crate::exact;
use crate::models::{Document, MatchType};
use crate::schema::SchemaMapping;
use crate::store::{AnnParams, VectorStore};

/// Smallest score a semantic hit can carry after rounding.
pub const MIN_SEMANTIC_SCORE: f64 = 0.0001;

/// Knobs shared by every per-collection search of one query.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Hits requested per collection.
    pub top_k: usize,
    /// ANN candidate-list size.
    pub candidate_list: usize,
    pub vector_field: String,
    /// Collections eligible for exact identifier lookup.
    pub exact_match_collections: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_list: 10,
            vector_field: "embedding".to_string(),
            exact_match_collections: vec!["jira_tickets".to_string(), "jira_issues".to_string()],
        }
    }
}

impl SearchOptions {
    pub fn ann_params(&self) -> AnnParams {
        AnnParams {
            vector_field: self.vector_field.clone(),
            candidate_list: self.candidate_list,
        }
    }
}

/// `round(1 / (1 + d), 4)`, kept strictly positive.
///
/// Negative or NaN distances are treated as zero.
pub fn distance_to_score(distance: f64) -> f64 {
    let d = if distance.is_nan() { 0.0 } else { distance.max(0.0) };
    let score = ((1.0 / (1.0 + d)) * 10_000.0).round() / 10_000.0;
    score.max(MIN_SEMANTIC_SCORE)
}

/// Nearest-neighbour search in one collection.
///
/// Results come back closest first, at most `opts.top_k` of them.
pub async fn semantic_search(
    store: &dyn VectorStore,
    collection: &str,
    mapping: &SchemaMapping,
    query_vec: &[f32],
    opts: &SearchOptions,
) -> Result<Vec<Document>> {
    let hits = store
        .search(
            collection,
            query_vec,
            opts.top_k,
            &mapping.output_fields,
            &opts.ann_params(),
        )
        .await?;

    Ok(hits
        .into_iter()
        .take(opts.top_k)
        .map(|hit| {
            mapping.normalize(
                collection,
                &hit.fields,
                distance_to_score(hit.distance),
                MatchType::Semantic,
            )
        })
        .collect())
}

/// Exact match when one exists, otherwise [`semantic_search`].
pub async fn hybrid_search(
    store: &dyn VectorStore,
    collection: &str,
    mapping: &SchemaMapping,
    query: &str,
    query_vec: &[f32],
    opts: &SearchOptions,
) -> Result<Vec<Document>> {
    if exact::is_applicable(collection, mapping, &opts.exact_match_collections) {
        if let Some(doc) = exact::lookup(store, collection, mapping, query).await {
            return Ok(vec![doc]);
        }
    }
    semantic_search(store, collection, mapping, query_vec, opts).await
}
