//! Indexing documents into a standard RAG collection.
//!
//! A RAG collection has the fields `id`, `source_type`, `source_id`,
//! `title`, `content`, `metadata`, `url` and `embedding`. It is created on
//! first use with the embedder's dimensionality. Re-indexing the same
//! `source_id` replaces the stored entity; identical content is detected via
//! a SHA-256 of the indexed fields and skipped without calling the embedder.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

use ragfuse_core::embedding::Embedder;
use ragfuse_core::store::{vector_dim, FieldDescriptor, FieldMap, VectorStore};

use crate::app::AppContext;
use crate::config::Config;
use crate::sqlite_store::{SqliteVectorStore, UpsertOutcome, ID_FIELD};

const KEY_FIELD: &str = "source_id";

/// One document to index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub collection: String,
    pub source_id: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn default_source_type() -> String {
    "document".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Inserted,
    Replaced,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub collection: String,
    pub source_id: String,
    pub id: i64,
    pub status: IndexStatus,
    pub created_collection: bool,
}

/// Fields of a standard RAG collection.
pub fn rag_schema(dims: usize) -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::primary(ID_FIELD),
        FieldDescriptor::text("source_type"),
        FieldDescriptor::text(KEY_FIELD),
        FieldDescriptor::text("title"),
        FieldDescriptor::text("content"),
        FieldDescriptor::json("metadata"),
        FieldDescriptor::text("url"),
        FieldDescriptor::vector("embedding", dims),
    ]
}

fn document_hash(req: &IndexRequest) -> String {
    let mut hasher = Sha256::new();
    for part in [
        req.source_type.as_str(),
        req.title.as_str(),
        req.content.as_str(),
        req.url.as_deref().unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    if let Some(metadata) = &req.metadata {
        hasher.update(metadata.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn entity_fields(req: &IndexRequest) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("source_type".into(), json!(req.source_type));
    fields.insert(KEY_FIELD.into(), json!(req.source_id));
    fields.insert("title".into(), json!(req.title));
    fields.insert("content".into(), json!(req.content));
    fields.insert(
        "metadata".into(),
        req.metadata.clone().unwrap_or_else(|| json!({})),
    );
    fields.insert("url".into(), json!(req.url.clone().unwrap_or_default()));
    fields
}

fn embedding_text(req: &IndexRequest) -> String {
    if req.title.trim().is_empty() {
        req.content.clone()
    } else {
        format!("{}\n\n{}", req.title, req.content)
    }
}

/// Store one document, creating its collection if needed.
pub async fn index_document(
    store: &SqliteVectorStore,
    embedder: &dyn Embedder,
    req: &IndexRequest,
) -> Result<IndexOutcome> {
    if req.collection.trim().is_empty() {
        bail!("collection must not be empty");
    }
    if req.source_id.trim().is_empty() {
        bail!("source_id must not be empty");
    }
    if req.content.trim().is_empty() {
        bail!("content must not be empty");
    }
    let dims = embedder.dims();
    if dims == 0 {
        bail!("Indexing requires embeddings. Set [embedding] provider in config.");
    }

    let created_collection = if store.collection_exists(&req.collection).await? {
        let schema = store.collection_schema(&req.collection).await?;
        if !schema.iter().any(|f| f.name == KEY_FIELD) {
            bail!(
                "collection {} has no {} field and cannot be indexed into",
                req.collection,
                KEY_FIELD
            );
        }
        if let Some(found) = vector_dim(&schema, "embedding") {
            if found != dims {
                bail!(
                    "collection {} has dimension {} but the embedder produces {}",
                    req.collection,
                    found,
                    dims
                );
            }
        }
        false
    } else {
        store
            .create_collection(&req.collection, &rag_schema(dims))
            .await?
    };

    let hash = document_hash(req);
    if let Some((id, Some(existing))) = store
        .find_by_field(&req.collection, KEY_FIELD, &req.source_id)
        .await?
    {
        if existing == hash {
            tracing::debug!(collection = %req.collection, source_id = %req.source_id, "unchanged");
            return Ok(IndexOutcome {
                collection: req.collection.clone(),
                source_id: req.source_id.clone(),
                id,
                status: IndexStatus::Unchanged,
                created_collection,
            });
        }
    }

    let vector = embedder
        .embed(&embedding_text(req))
        .await
        .context("Failed to embed document")?;

    let outcome = store
        .upsert(
            &req.collection,
            KEY_FIELD,
            &entity_fields(req),
            &vector,
            Some(&hash),
        )
        .await?;

    let (id, status) = match outcome {
        UpsertOutcome::Inserted(id) => (id, IndexStatus::Inserted),
        UpsertOutcome::Replaced(id) => (id, IndexStatus::Replaced),
        UpsertOutcome::Unchanged(id) => (id, IndexStatus::Unchanged),
    };
    tracing::info!(collection = %req.collection, source_id = %req.source_id, ?status, "indexed");

    Ok(IndexOutcome {
        collection: req.collection.clone(),
        source_id: req.source_id.clone(),
        id,
        status,
        created_collection,
    })
}

/// Arguments of `ragfuse index`.
pub struct IndexArgs {
    pub collection: String,
    pub source_id: String,
    pub source_type: String,
    pub title: Option<String>,
    pub file: std::path::PathBuf,
    pub url: Option<String>,
}

pub async fn run_index(config: &Config, args: IndexArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let title = args.title.unwrap_or_else(|| file_title(&args.file));

    let ctx = AppContext::open(config, false).await?;
    let req = IndexRequest {
        collection: args.collection,
        source_id: args.source_id,
        source_type: args.source_type,
        title,
        content,
        url: args.url,
        metadata: Some(json!({ "path": args.file.display().to_string() })),
    };
    let outcome = index_document(ctx.store(), ctx.embedder(), &req).await?;

    if outcome.created_collection {
        println!("Created collection {}", outcome.collection);
    }
    let verb = match outcome.status {
        IndexStatus::Inserted => "Indexed",
        IndexStatus::Replaced => "Re-indexed",
        IndexStatus::Unchanged => "Unchanged",
    };
    println!(
        "{} {} in {} (id {})",
        verb, outcome.source_id, outcome.collection, outcome.id
    );

    ctx.close().await;
    Ok(())
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> IndexRequest {
        IndexRequest {
            collection: "docs".into(),
            source_id: "DOC-1".into(),
            source_type: "document".into(),
            title: "Title".into(),
            content: "Body".into(),
            url: None,
            metadata: None,
        }
    }

    #[test]
    fn test_document_hash_tracks_content() {
        let a = request();
        let mut b = request();
        assert_eq!(document_hash(&a), document_hash(&b));
        b.content = "Changed".into();
        assert_ne!(document_hash(&a), document_hash(&b));
    }

    #[test]
    fn test_rag_schema_has_single_vector() {
        let schema = rag_schema(384);
        assert_eq!(schema.iter().filter(|f| f.is_vector()).count(), 1);
        assert_eq!(vector_dim(&schema, "embedding"), Some(384));
        assert!(schema[0].is_primary);
    }

    #[test]
    fn test_entity_fields_defaults() {
        let fields = entity_fields(&request());
        assert_eq!(fields["source_id"], "DOC-1");
        assert_eq!(fields["url"], "");
        assert_eq!(fields["metadata"], json!({}));
    }

    #[test]
    fn test_embedding_text() {
        assert_eq!(embedding_text(&request()), "Title\n\nBody");
        let mut req = request();
        req.title = String::new();
        assert_eq!(embedding_text(&req), "Body");
    }
}
