//! In-memory [`VectorStore`] implementation for testing and WASM targets.
//!
//! Collections live in a `BTreeMap` behind `std::sync::RwLock`.
//! Vector search is brute-force L2 distance over every stored entity.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::l2_distance;

use super::{project, AnnParams, FieldDescriptor, FieldMap, Filter, SearchHit, VectorStore};

struct StoredEntity {
    fields: FieldMap,
    vector: Vec<f32>,
}

struct StoredCollection {
    schema: Vec<FieldDescriptor>,
    entities: Vec<StoredEntity>,
}

impl StoredCollection {
    fn dim(&self) -> Option<usize> {
        self.schema.iter().find(|f| f.is_vector()).and_then(|f| f.dim)
    }
}

/// In-memory vector store for tests and embedding the library.
pub struct InMemoryVectorStore {
    collections: RwLock<BTreeMap<String, StoredCollection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredCollection>> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredCollection>> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a collection. Re-creating an existing collection is a no-op.
    pub fn create_collection(&self, name: &str, schema: Vec<FieldDescriptor>) {
        self.write()
            .entry(name.to_string())
            .or_insert_with(|| StoredCollection {
                schema,
                entities: Vec::new(),
            });
    }

    /// Insert an entity with its vector.
    pub fn insert(&self, collection: &str, fields: FieldMap, vector: Vec<f32>) -> Result<()> {
        let mut guard = self.write();
        let coll = guard
            .get_mut(collection)
            .ok_or_else(|| anyhow!("collection not found: {}", collection))?;
        if let Some(dim) = coll.dim() {
            if dim != vector.len() {
                bail!(
                    "vector dimension {} does not match collection dimension {}",
                    vector.len(),
                    dim
                );
            }
        }
        coll.entities.push(StoredEntity { fields, vector });
        Ok(())
    }

    /// Replace every entity whose `key_field` equals the new entity's value,
    /// then insert it.
    pub fn upsert(
        &self,
        collection: &str,
        key_field: &str,
        fields: FieldMap,
        vector: Vec<f32>,
    ) -> Result<()> {
        if let Some(key) = fields.get(key_field).cloned() {
            let mut guard = self.write();
            if let Some(coll) = guard.get_mut(collection) {
                coll.entities
                    .retain(|e| e.fields.get(key_field) != Some(&key));
            }
        }
        self.insert(collection, fields, vector)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.read().keys().cloned().collect())
    }

    async fn collection_schema(&self, name: &str) -> Result<Vec<FieldDescriptor>> {
        self.read()
            .get(name)
            .map(|c| c.schema.clone())
            .ok_or_else(|| anyhow!("collection not found: {}", name))
    }

    async fn entity_count(&self, name: &str) -> Result<usize> {
        self.read()
            .get(name)
            .map(|c| c.entities.len())
            .ok_or_else(|| anyhow!("collection not found: {}", name))
    }

    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        top_k: usize,
        output_fields: &[String],
        _params: &AnnParams,
    ) -> Result<Vec<SearchHit>> {
        let guard = self.read();
        let coll = guard
            .get(collection)
            .ok_or_else(|| anyhow!("collection not found: {}", collection))?;
        if let Some(dim) = coll.dim() {
            if dim != query_vec.len() {
                bail!(
                    "query dimension {} does not match collection dimension {}",
                    query_vec.len(),
                    dim
                );
            }
        }

        let mut hits: Vec<SearchHit> = coll
            .entities
            .iter()
            .map(|e| SearchHit {
                distance: l2_distance(query_vec, &e.vector) as f64,
                fields: project(&e.fields, output_fields),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn exact_query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<FieldMap>> {
        let guard = self.read();
        let coll = guard
            .get(collection)
            .ok_or_else(|| anyhow!("collection not found: {}", collection))?;
        Ok(coll
            .entities
            .iter()
            .filter(|e| filter.matches(&e.fields))
            .take(limit)
            .map(|e| project(&e.fields, output_fields))
            .collect())
    }
}
