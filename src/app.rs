//! Runtime wiring shared by the CLI commands and the HTTP server.
//!
//! [`AppContext::open`] connects to SQLite, applies migrations and builds
//! the configured embedder, completion backend and token tracker, then
//! assembles the [`RagPipeline`] from them.

use anyhow::Result;
use std::sync::Arc;

use ragfuse_core::completion::Completion;
use ragfuse_core::embedding::Embedder;
use ragfuse_core::pipeline::RagPipeline;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::{create_completion, DisabledCompletion};
use crate::migrate;
use crate::sqlite_store::SqliteVectorStore;
use crate::usage::TokenTracker;

pub struct AppContext {
    store: Arc<SqliteVectorStore>,
    embedder: Arc<dyn Embedder>,
    tracker: Option<Arc<TokenTracker>>,
    pipeline: RagPipeline,
}

impl AppContext {
    /// Open the database and build every collaborator.
    ///
    /// With `with_llm = false` the completion backend is left disabled, so
    /// retrieval-only commands never need LLM credentials.
    pub async fn open(config: &Config, with_llm: bool) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let store = Arc::new(SqliteVectorStore::new(pool.clone()));
        let embedder = create_embedder(&config.embedding)?;
        let completion: Arc<dyn Completion> = if with_llm {
            create_completion(&config.llm)?
        } else {
            Arc::new(DisabledCompletion)
        };
        let tracker = config
            .usage
            .enabled
            .then(|| Arc::new(TokenTracker::new(pool, &config.usage)));

        let mut pipeline = RagPipeline::new(
            store.clone(),
            embedder.clone(),
            completion,
            config.retrieval.pipeline_config(),
        );
        if let Some(tracker) = &tracker {
            pipeline = pipeline.with_usage_recorder(tracker.clone());
        }

        Ok(Self {
            store,
            embedder,
            tracker,
            pipeline,
        })
    }

    pub fn store(&self) -> &SqliteVectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    pub fn tracker(&self) -> Option<&TokenTracker> {
        self.tracker.as_deref()
    }

    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}
