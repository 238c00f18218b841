//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only way the retrieval pipeline touches
//! the vector database. A store is a set of independently-schemed
//! collections; each collection declares its fields (one of which is the
//! float vector field) and answers L2 nearest-neighbour searches and
//! equality-filtered lookups.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Raw field-value mapping of one stored entity.
pub type FieldMap = serde_json::Map<String, Value>;

/// Declared type of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int64,
    VarChar,
    Json,
    FloatVector,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Int64 => "int64",
            FieldType::VarChar => "varchar",
            FieldType::Json => "json",
            FieldType::FloatVector => "float_vector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "int64" => Some(FieldType::Int64),
            "varchar" => Some(FieldType::VarChar),
            "json" => Some(FieldType::Json),
            "float_vector" => Some(FieldType::FloatVector),
            _ => None,
        }
    }
}

/// One field of a collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Declared dimensionality, only set for vector fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    #[serde(default)]
    pub is_primary: bool,
}

impl FieldDescriptor {
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Int64,
            dim: None,
            is_primary: true,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::VarChar,
            dim: None,
            is_primary: false,
        }
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Json,
            dim: None,
            is_primary: false,
        }
    }

    pub fn vector(name: impl Into<String>, dim: usize) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::FloatVector,
            dim: Some(dim),
            is_primary: false,
        }
    }

    pub fn is_vector(&self) -> bool {
        self.field_type == FieldType::FloatVector
    }
}

/// Declared dimensionality of the collection's vector field.
///
/// Looks for a vector field named `vector_field` first, then falls back to
/// the first vector-typed field in the schema.
pub fn vector_dim(schema: &[FieldDescriptor], vector_field: &str) -> Option<usize> {
    schema
        .iter()
        .find(|f| f.is_vector() && f.name == vector_field)
        .or_else(|| schema.iter().find(|f| f.is_vector()))
        .and_then(|f| f.dim)
}

/// Filter for [`VectorStore::exact_query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Value },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &FieldMap) -> bool {
        match self {
            Filter::Eq { field, value } => fields.get(field) == Some(value),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq {
                field,
                value: Value::String(s),
            } => write!(f, "{} == '{}'", field, s.replace('\'', "\\'")),
            Filter::Eq { field, value } => write!(f, "{} == {}", field, value),
        }
    }
}

/// Approximate-nearest-neighbour parameters for [`VectorStore::search`].
#[derive(Debug, Clone)]
pub struct AnnParams {
    /// Name of the vector field to search.
    pub vector_field: String,
    /// Candidate-list size (`nprobe`-style) handed to the index.
    pub candidate_list: usize,
}

impl Default for AnnParams {
    fn default() -> Self {
        Self {
            vector_field: "embedding".to_string(),
            candidate_list: 10,
        }
    }
}

/// One nearest-neighbour hit with its L2 distance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub distance: f64,
    pub fields: FieldMap,
}

/// Abstract vector database backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_collections`](VectorStore::list_collections) | Enumerate collections (also the connectivity probe) |
/// | [`collection_schema`](VectorStore::collection_schema) | Declared fields of one collection |
/// | [`entity_count`](VectorStore::entity_count) | Number of indexed entities |
/// | [`search`](VectorStore::search) | L2 nearest-neighbour search |
/// | [`exact_query`](VectorStore::exact_query) | Filtered lookup without similarity |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// List every collection, in whatever order the backend enumerates them.
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn collection_schema(&self, name: &str) -> Result<Vec<FieldDescriptor>>;

    async fn entity_count(&self, name: &str) -> Result<usize>;

    /// Nearest-neighbour search using L2 distance.
    ///
    /// Returns at most `top_k` hits, closest first, each projected onto
    /// `output_fields`.
    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        top_k: usize,
        output_fields: &[String],
        params: &AnnParams,
    ) -> Result<Vec<SearchHit>>;

    /// Return up to `limit` entities matching `filter`, projected onto
    /// `output_fields`.
    async fn exact_query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[String],
        limit: usize,
    ) -> Result<Vec<FieldMap>>;
}

/// Project an entity onto the requested output fields.
///
/// Missing fields are skipped rather than reported.
pub fn project(fields: &FieldMap, output_fields: &[String]) -> FieldMap {
    output_fields
        .iter()
        .filter_map(|name| fields.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}
