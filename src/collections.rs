//! Collection listing.

use anyhow::Result;
use serde::Serialize;

use ragfuse_core::store::{vector_dim, VectorStore};

use crate::app::AppContext;
use crate::config::Config;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub entities: usize,
    pub dim: Option<usize>,
}

/// Every collection with its entity count and vector dimensionality.
pub async fn list_collections(
    store: &dyn VectorStore,
    vector_field: &str,
) -> Result<Vec<CollectionInfo>> {
    let mut out = Vec::new();
    for name in store.list_collections().await? {
        let schema = store.collection_schema(&name).await?;
        let entities = store.entity_count(&name).await?;
        out.push(CollectionInfo {
            dim: vector_dim(&schema, vector_field),
            name,
            entities,
        });
    }
    Ok(out)
}

pub async fn run_collections(config: &Config) -> Result<()> {
    let ctx = AppContext::open(config, false).await?;
    let infos = list_collections(ctx.store(), &config.retrieval.vector_field).await?;

    if infos.is_empty() {
        println!("No collections.");
    } else {
        println!("{:<32} {:>10} {:>6}", "COLLECTION", "ENTITIES", "DIM");
        for info in &infos {
            let dim = info
                .dim
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:<32} {:>10} {:>6}", info.name, info.entities, dim);
        }
    }

    ctx.close().await;
    Ok(())
}
