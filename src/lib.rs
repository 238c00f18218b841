//! # ragfuse
//!
//! Multi-collection hybrid retrieval and answer fusion for
//! retrieval-augmented generation.
//!
//! A query is matched against every indexed collection at once: collections
//! that hold structured identifiers (ticket keys such as `PROJ-123`) are
//! checked for an exact match first, the rest are searched by vector
//! similarity. Results are interleaved so that no single collection crowds
//! out the others, handed to an LLM, and the answer comes back with a
//! confidence verdict combining retrieval quality and the model's own
//! self-assessment.
//!
//! The retrieval and fusion algorithms live in [`ragfuse_core`]; this crate
//! supplies the SQLite-backed vector store, embedding and LLM providers,
//! token accounting, CLI and HTTP server.
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────┐
//! │  CLI /   │──▶│ ragfuse-core │──▶│ VectorStore  │──▶│ SQLite │
//! │  HTTP    │   │   pipeline   │   │  (sqlite)    │   └────────┘
//! └──────────┘   └──────┬───────┘   └──────────────┘
//!                       │
//!            ┌──────────┴──────────┐
//!            ▼                     ▼
//!       ┌──────────┐         ┌───────────┐
//!       │ Embedder │         │ Completion│──▶ TokenTracker
//!       └──────────┘         └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`], [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | `VectorStore` persisted in SQLite |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Completion providers |
//! | [`usage`] | Token usage and cost tracking |
//! | [`app`] | Wiring of store, providers and pipeline |
//! | [`ingest`] | Indexing documents into RAG collections |
//! | [`collections`], [`search`], [`ask`], [`usage_cmd`] | CLI commands |
//! | [`server`] | HTTP API |
//! | [`logging`] | tracing subscriber setup |

pub mod app;
pub mod ask;
pub mod collections;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod usage;
pub mod usage_cmd;
