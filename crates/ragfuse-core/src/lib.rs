//! # ragfuse core
//!
//! Retrieval and fusion logic for ragfuse: schema resolution, exact-match
//! lookup, per-collection vector search, multi-collection fan-out, diversity
//! interleaving and confidence estimation.
//!
//! The vector database, embedding model and LLM backend are consumed through
//! the [`store::VectorStore`], [`embedding::Embedder`] and
//! [`completion::Completion`] traits. This crate contains no tokio, sqlx,
//! HTTP clients or filesystem I/O.
//!
//! ```text
//! query ──▶ exact ──▶ search × N (fanout) ──▶ interleave ──▶ prompt
//!                                                             │
//!            AnswerResponse ◀── confidence ◀── completion ◀───┘
//! ```

pub mod completion;
pub mod confidence;
pub mod embedding;
pub mod error;
pub mod exact;
pub mod fanout;
pub mod interleave;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod search;
pub mod store;
