//! Error taxonomy for query calls.
//!
//! Only failures that make the whole query meaningless are represented
//! here. A single collection failing, an exact-match lookup failing or a
//! malformed confidence marker are downgraded to summary entries and log
//! lines instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The vector store could not be reached at all.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The query could not be embedded.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The LLM backend failed to produce an answer.
    #[error("completion failed: {0}")]
    Completion(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
