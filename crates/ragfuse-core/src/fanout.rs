//! Multi-collection fan-out.
//!
//! Every collection is searched independently. Empty collections and those
//! whose vector dimensionality does not match the query vector are skipped;
//! any failure is confined to its own collection and recorded in the
//! [`SearchSummary`]. Up to `concurrency` searches are in flight at once;
//! results are folded into the accumulator on a single task.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::RetrievalError;
use crate::models::{CollectionStatus, Document, SearchSummary};
use crate::schema;
use crate::search::{hybrid_search, SearchOptions};
use crate::store::{vector_dim, VectorStore};

/// Documents and per-collection report from one fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    /// Unordered; pass through [`crate::interleave::interleave`] for ranking.
    pub documents: Vec<Document>,
    pub summary: Vec<SearchSummary>,
}

impl FanOutResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

async fn try_search_one(
    store: &dyn VectorStore,
    collection: &str,
    query: &str,
    query_vec: &[f32],
    opts: &SearchOptions,
) -> anyhow::Result<(Vec<Document>, CollectionStatus)> {
    if store.entity_count(collection).await? == 0 {
        return Ok((Vec::new(), CollectionStatus::Empty));
    }

    let fields = store.collection_schema(collection).await?;
    if let Some(dim) = vector_dim(&fields, &opts.vector_field) {
        if dim != query_vec.len() {
            return Ok((
                Vec::new(),
                CollectionStatus::Incompatible {
                    expected: query_vec.len(),
                    found: dim,
                },
            ));
        }
    }

    let mapping = schema::resolve(&fields);
    debug!(collection = %collection, kind = ?mapping.kind, "resolved schema");
    let docs = hybrid_search(store, collection, &mapping, query, query_vec, opts).await?;
    let found = docs.len();
    Ok((docs, CollectionStatus::Found { docs: found }))
}

async fn search_one(
    store: &dyn VectorStore,
    collection: &str,
    query: &str,
    query_vec: &[f32],
    opts: &SearchOptions,
) -> (Vec<Document>, CollectionStatus) {
    try_search_one(store, collection, query, query_vec, opts)
        .await
        .unwrap_or_else(|e| {
            (
                Vec::new(),
                CollectionStatus::Error {
                    message: format!("{:#}", e),
                },
            )
        })
}

/// Search the named collections and gather their results.
///
/// Never fails: per-collection problems become summary entries.
pub async fn search_collections(
    store: &dyn VectorStore,
    collections: &[String],
    query: &str,
    query_vec: &[f32],
    opts: &SearchOptions,
    concurrency: usize,
) -> FanOutResult {
    let outcomes: Vec<(String, Vec<Document>, CollectionStatus)> =
        stream::iter(collections.iter().cloned())
            .map(|name: String| async move {
                let (docs, status) = search_one(store, &name, query, query_vec, opts).await;
                (name, docs, status)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

    let mut result = FanOutResult::default();
    for (name, docs, status) in outcomes {
        match &status {
            CollectionStatus::Error { message } => {
                warn!(collection = %name, error = %message, "collection search failed");
            }
            CollectionStatus::Incompatible { expected, found } => {
                info!(collection = %name, expected, found, "skipping incompatible collection");
            }
            _ => debug!(collection = %name, status = ?status, "collection searched"),
        }
        result.documents.extend(docs);
        result.summary.push(SearchSummary::new(name, status));
    }

    info!(
        collections = result.summary.len(),
        documents = result.documents.len(),
        "fan-out complete"
    );
    result
}

/// Search every collection the store knows about.
///
/// Fails only when the store cannot enumerate its collections.
pub async fn fan_out(
    store: &dyn VectorStore,
    query: &str,
    query_vec: &[f32],
    opts: &SearchOptions,
    concurrency: usize,
) -> Result<FanOutResult, RetrievalError> {
    let collections = store
        .list_collections()
        .await
        .map_err(|e| RetrievalError::StoreUnavailable(format!("{:#}", e)))?;
    Ok(search_collections(store, &collections, query, query_vec, opts, concurrency).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::{FieldDescriptor, FieldMap};
    use serde_json::json;

    fn rag_schema(dim: usize) -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::primary("id"),
            FieldDescriptor::text("source_type"),
            FieldDescriptor::text("source_id"),
            FieldDescriptor::text("title"),
            FieldDescriptor::text("content"),
            FieldDescriptor::vector("embedding", dim),
        ]
    }

    fn add(store: &InMemoryVectorStore, collection: &str, id: &str, vec: Vec<f32>) {
        let mut fields = FieldMap::new();
        fields.insert("source_type".into(), json!(collection));
        fields.insert("source_id".into(), json!(id));
        fields.insert("title".into(), json!(id));
        store.insert(collection, fields, vec).unwrap();
    }

    #[tokio::test]
    async fn test_statuses_per_collection() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", rag_schema(2));
        add(&store, "docs", "a", vec![0.0, 0.0]);
        add(&store, "docs", "b", vec![1.0, 1.0]);
        store.create_collection("empty", rag_schema(2));
        store.create_collection("wide", rag_schema(3));
        add(&store, "wide", "w", vec![0.0, 0.0, 0.0]);

        let result = fan_out(&store, "q", &[0.0, 0.0], &SearchOptions::default(), 2)
            .await
            .unwrap();

        assert_eq!(result.documents.len(), 2);
        let by_name = |n: &str| {
            result
                .summary
                .iter()
                .find(|s| s.collection == n)
                .map(|s| s.status.clone())
                .unwrap()
        };
        assert_eq!(by_name("docs"), CollectionStatus::Found { docs: 2 });
        assert_eq!(by_name("empty"), CollectionStatus::Empty);
        assert_eq!(
            by_name("wide"),
            CollectionStatus::Incompatible {
                expected: 2,
                found: 3
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_collection_is_an_error_entry() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", rag_schema(2));
        add(&store, "docs", "a", vec![0.0, 0.0]);

        let names = vec!["docs".to_string(), "ghost".to_string()];
        let result =
            search_collections(&store, &names, "q", &[0.0, 0.0], &SearchOptions::default(), 1)
                .await;
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.summary.len(), 2);
        assert!(matches!(
            result.summary[1].status,
            CollectionStatus::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_summary_keeps_traversal_order() {
        let store = InMemoryVectorStore::new();
        for name in ["c", "a", "b"] {
            store.create_collection(name, rag_schema(2));
            add(&store, name, name, vec![0.0, 0.0]);
        }
        let names: Vec<String> = ["c", "a", "b"].iter().map(|s| s.to_string()).collect();
        let result =
            search_collections(&store, &names, "q", &[0.0, 0.0], &SearchOptions::default(), 3)
                .await;
        let order: Vec<&str> = result.summary.iter().map(|s| s.collection.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
