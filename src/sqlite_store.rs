//! SQLite-backed [`VectorStore`].
//!
//! Collections and their declared fields live in `collections` /
//! `collection_fields`; entities store their field values as a JSON object
//! and their vector as a little-endian f32 BLOB. Nearest-neighbour search
//! is a brute-force L2 scan of the collection, which is adequate for the
//! single-machine corpus sizes this store targets.
//!
//! The entity's row id is exposed as the `id` field.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};

use ragfuse_core::embedding::{blob_to_vec, l2_distance, vec_to_blob};
use ragfuse_core::store::{
    project, vector_dim, AnnParams, FieldDescriptor, FieldMap, FieldType, Filter, SearchHit,
    VectorStore,
};

/// Primary-key field name exposed on every entity.
pub const ID_FIELD: &str = "id";

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

/// Result of [`SqliteVectorStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Replaced(i64),
    /// An entity with the same key and content hash already exists.
    Unchanged(i64),
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Create a collection with the given fields.
    ///
    /// Returns `false` without touching anything if it already exists.
    pub async fn create_collection(&self, name: &str, schema: &[FieldDescriptor]) -> Result<bool> {
        if name.trim().is_empty() {
            bail!("collection name must not be empty");
        }
        if self.collection_exists(name).await? {
            return Ok(false);
        }
        if schema.iter().filter(|f| f.is_vector()).count() != 1 {
            bail!("collection {} must declare exactly one vector field", name);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        for (position, field) in schema.iter().enumerate() {
            sqlx::query(
                "INSERT INTO collection_fields (collection, position, name, field_type, dim, is_primary) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(position as i64)
            .bind(&field.name)
            .bind(field.field_type.as_str())
            .bind(field.dim.map(|d| d as i64))
            .bind(field.is_primary)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(collection = %name, fields = schema.len(), "created collection");
        Ok(true)
    }

    async fn expected_dim(&self, collection: &str) -> Result<Option<usize>> {
        let schema = self.collection_schema(collection).await?;
        Ok(vector_dim(&schema, ""))
    }

    async fn check_dim(&self, collection: &str, vector: &[f32]) -> Result<()> {
        if let Some(dim) = self.expected_dim(collection).await? {
            if dim != vector.len() {
                bail!(
                    "vector dimension {} does not match collection {} dimension {}",
                    vector.len(),
                    collection,
                    dim
                );
            }
        }
        Ok(())
    }

    /// Insert a new entity and return its id.
    pub async fn insert(
        &self,
        collection: &str,
        fields: &FieldMap,
        vector: &[f32],
        dedup_hash: Option<&str>,
    ) -> Result<i64> {
        self.check_dim(collection, vector).await?;
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut conn, collection, fields, vector, dedup_hash).await
    }

    /// Id and content hash of the first entity whose `key_field` equals `value`.
    pub async fn find_by_field(
        &self,
        collection: &str,
        key_field: &str,
        value: &str,
    ) -> Result<Option<(i64, Option<String>)>> {
        let row = sqlx::query(
            "SELECT id, dedup_hash FROM entities \
             WHERE collection = ? AND json_extract(fields_json, ?) = ? \
             ORDER BY id LIMIT 1",
        )
        .bind(collection)
        .bind(format!("$.{}", key_field))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| (r.get::<i64, _>("id"), r.get::<Option<String>, _>("dedup_hash"))))
    }

    /// Insert, or replace the entity sharing `key_field`'s value.
    ///
    /// When `dedup_hash` matches the stored hash the entity is left alone.
    pub async fn upsert(
        &self,
        collection: &str,
        key_field: &str,
        fields: &FieldMap,
        vector: &[f32],
        dedup_hash: Option<&str>,
    ) -> Result<UpsertOutcome> {
        let key = fields
            .get(key_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("entity has no string field '{}'", key_field))?;

        match self.find_by_field(collection, key_field, key).await? {
            Some((id, existing)) if dedup_hash.is_some() && existing.as_deref() == dedup_hash => {
                Ok(UpsertOutcome::Unchanged(id))
            }
            Some(_) => {
                self.check_dim(collection, vector).await?;
                let mut tx = self.pool.begin().await?;
                sqlx::query(
                    "DELETE FROM entities WHERE collection = ? AND json_extract(fields_json, ?) = ?",
                )
                .bind(collection)
                .bind(format!("$.{}", key_field))
                .bind(key)
                .execute(&mut *tx)
                .await?;
                let id = insert_row(&mut tx, collection, fields, vector, dedup_hash).await?;
                tx.commit().await?;
                Ok(UpsertOutcome::Replaced(id))
            }
            None => {
                let id = self.insert(collection, fields, vector, dedup_hash).await?;
                Ok(UpsertOutcome::Inserted(id))
            }
        }
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            bail!("collection not found: {}", name);
        }
        Ok(())
    }

    async fn load_entities(&self, collection: &str) -> Result<Vec<(FieldMap, Vec<f32>)>> {
        let rows = sqlx::query(
            "SELECT id, fields_json, vector FROM entities WHERE collection = ? ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let json: String = row.get("fields_json");
                let blob: Vec<u8> = row.get("vector");
                let mut fields: FieldMap = serde_json::from_str(&json)
                    .with_context(|| format!("corrupt fields for entity {}", id))?;
                fields.insert(ID_FIELD.to_string(), id.into());
                Ok((fields, blob_to_vec(&blob)))
            })
            .collect()
    }
}

async fn insert_row(
    conn: &mut SqliteConnection,
    collection: &str,
    fields: &FieldMap,
    vector: &[f32],
    dedup_hash: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO entities (collection, fields_json, vector, dedup_hash) VALUES (?, ?, ?, ?)",
    )
    .bind(collection)
    .bind(serde_json::to_string(fields)?)
    .bind(vec_to_blob(vector))
    .bind(dedup_hash)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM collections ORDER BY created_at, name")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    async fn collection_schema(&self, name: &str) -> Result<Vec<FieldDescriptor>> {
        self.ensure_exists(name).await?;
        let rows = sqlx::query(
            "SELECT name, field_type, dim, is_primary FROM collection_fields \
             WHERE collection = ? ORDER BY position",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let type_name: String = row.get("field_type");
                let field_type = FieldType::parse(&type_name)
                    .ok_or_else(|| anyhow!("unknown field type '{}' in {}", type_name, name))?;
                Ok(FieldDescriptor {
                    name: row.get("name"),
                    field_type,
                    dim: row.get::<Option<i64>, _>("dim").map(|d| d as usize),
                    is_primary: row.get("is_primary"),
                })
            })
            .collect()
    }

    async fn entity_count(&self, name: &str) -> Result<usize> {
        self.ensure_exists(name).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE collection = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        top_k: usize,
        output_fields: &[String],
        params: &AnnParams,
    ) -> Result<Vec<SearchHit>> {
        let schema = self.collection_schema(collection).await?;
        if let Some(dim) = vector_dim(&schema, &params.vector_field) {
            if dim != query_vec.len() {
                bail!(
                    "query dimension {} does not match collection dimension {}",
                    query_vec.len(),
                    dim
                );
            }
        }

        let mut hits: Vec<SearchHit> = self
            .load_entities(collection)
            .await?
            .into_iter()
            .map(|(fields, vector)| SearchHit {
                distance: l2_distance(query_vec, &vector) as f64,
                fields: project(&fields, output_fields),
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
        self.ensure_exists(collection).await?;
        Ok(self
            .load_entities(collection)
            .await?
            .into_iter()
            .filter(|(fields, _)| filter.matches(fields))
            .take(limit)
            .map(|(fields, _)| project(&fields, output_fields))
            .collect())
    }
}
