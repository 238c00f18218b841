//! Core data models for the retrieval and fusion pipeline.
//!
//! These types are constructed per query and never persisted: a
//! [`Document`] is the unit handed between retrieval, interleaving and
//! confidence estimation, [`SearchSummary`] records what happened in each
//! collection, and [`ConfidenceResult`] is the verdict attached to an answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How a [`Document`] was retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Direct equality lookup on a structured identifier.
    Exact,
    /// Nearest-neighbour vector search.
    Semantic,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => f.write_str("exact"),
            MatchType::Semantic => f.write_str("semantic"),
        }
    }
}

/// A normalized retrieval result.
///
/// The fusion stage only relies on `collection`, `score` and `match_type`.
/// Everything collection-specific (functions, classes, parameters, ...)
/// lives in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Collection the document was retrieved from.
    pub collection: String,
    /// Semantic category, e.g. `"jira"`, `"python file"`, `"action_log"`.
    pub source_type: String,
    /// Natural key within the source domain (ticket key, file name, ...).
    pub source_id: String,
    pub title: String,
    /// Retrievable text, already truncated by the schema mapping.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Relevance in `[0.0, 1.0]`.
    pub score: f64,
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Document {
    /// An otherwise empty document carrying only the fields fusion needs.
    pub fn new(collection: impl Into<String>, score: f64, match_type: MatchType) -> Self {
        Self {
            collection: collection.into(),
            source_type: String::new(),
            source_id: String::new(),
            title: String::new(),
            content: String::new(),
            url: None,
            score,
            match_type,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.match_type == MatchType::Exact
    }
}

/// Outcome of searching one collection during fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionStatus {
    /// The collection holds zero entities; no search was attempted.
    Empty,
    /// The collection's vector dimensionality differs from the embedder's.
    Incompatible { expected: usize, found: usize },
    /// Schema inspection or search failed.
    Error { message: String },
    /// Search ran and returned `docs` documents (possibly zero).
    Found { docs: usize },
}

/// Per-collection record produced once per fan-out call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub collection: String,
    #[serde(flatten)]
    pub status: CollectionStatus,
}

impl SearchSummary {
    pub fn new(collection: impl Into<String>, status: CollectionStatus) -> Self {
        Self {
            collection: collection.into(),
            status,
        }
    }
}

impl fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CollectionStatus::Empty => write!(f, "{}: EMPTY", self.collection),
            CollectionStatus::Incompatible { expected, found } => write!(
                f,
                "{}: INCOMPATIBLE (dimension {} vs {})",
                self.collection, found, expected
            ),
            CollectionStatus::Error { message } => {
                write!(f, "{}: ERROR ({})", self.collection, message)
            }
            CollectionStatus::Found { docs: 0 } => write!(f, "{}: 0 relevant", self.collection),
            CollectionStatus::Found { docs } => write!(f, "{}: {} docs", self.collection, docs),
        }
    }
}

/// Discrete confidence label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "No Data")]
    NoData,
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ConfidenceLevel {
    /// Map a score onto the fixed thresholds shared by source and answer
    /// confidence: ≥0.8 Very High, ≥0.65 High, ≥0.5 Medium, ≥0.3 Low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::VeryHigh
        } else if score >= 0.65 {
            ConfidenceLevel::High
        } else if score >= 0.5 {
            ConfidenceLevel::Medium
        } else if score >= 0.3 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::NoData => "No Data",
            ConfidenceLevel::VeryLow => "Very Low",
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::High => "High",
            ConfidenceLevel::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weighted contribution of each source-quality factor to the total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub source_quality: f64,
    pub source_quantity: f64,
    pub source_diversity: f64,
    pub high_quality_sources: f64,
}

impl ConfidenceFactors {
    pub fn total(&self) -> f64 {
        self.source_quality + self.source_quantity + self.source_diversity + self.high_quality_sources
    }
}

/// Which scores a [`ConfidenceResult`] was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceKind {
    /// Model self-assessment, with source confidence attached.
    Dual,
    /// Retrieval quality only.
    SourceOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: f64,
    pub level: ConfidenceLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<ConfidenceFactors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_confidence: Option<Box<ConfidenceResult>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ConfidenceKind>,
}

/// Token accounting for one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub response_time_ms: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, response_time_ms: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            response_time_ms,
        }
    }
}

/// Final envelope returned by the query-answering pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<Document>,
    pub confidence_score: ConfidenceResult,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub search_summary: Vec<SearchSummary>,
}
