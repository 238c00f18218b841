//! Query-answering pipeline.
//!
//! [`RagPipeline`] owns the three collaborators and drives one query from
//! text to [`AnswerResponse`]:
//!
//! 1. list collections (the store connectivity check)
//! 2. embed the query once
//! 3. fan out, or search a single collection
//! 4. interleave
//! 5. build the prompt and call the completion backend
//! 6. parse the self-reported confidence and combine it with source confidence
//!
//! Usage accounting goes through an optional, explicitly injected
//! [`UsageRecorder`]. A failing recorder never fails the query.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::completion::Completion;
use crate::confidence;
use crate::embedding::Embedder;
use crate::error::{Result, RetrievalError};
use crate::fanout::{self, FanOutResult};
use crate::interleave::interleave;
use crate::models::{AnswerResponse, Document, SearchSummary, TokenUsage};
use crate::prompt::build_prompt;
use crate::schema::truncate_chars;
use crate::search::SearchOptions;
use crate::store::VectorStore;

/// Answer returned when retrieval finds nothing; the LLM is not consulted.
pub const NO_RESULTS_ANSWER: &str =
    "No relevant information found. Check that the vector store is reachable and that the selected collection has been indexed.";

/// Longest question text kept in a usage record.
pub const MAX_RECORDED_QUESTION_CHARS: usize = 500;

/// Which collections a query runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Collection(String),
}

impl Scope {
    /// `"all"` and `"all_collections"` select every collection.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "all" | "all_collections" => Scope::All,
            name => Scope::Collection(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scope::All => "all",
            Scope::Collection(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search: SearchOptions,
    /// Per-collection depth used when answering is at least this.
    pub min_top_k: usize,
    /// Characters of content per document placed in the prompt.
    pub content_limit: usize,
    pub confidence_marker: String,
    /// Maximum concurrent collection searches.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search: SearchOptions::default(),
            min_top_k: 7,
            content_limit: 1000,
            confidence_marker: "ANSWER_CONFIDENCE".to_string(),
            concurrency: 4,
        }
    }
}

/// Ranked documents plus the per-collection report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Retrieval {
    pub documents: Vec<Document>,
    pub summary: Vec<SearchSummary>,
}

/// One answered (or failed) query, as handed to a [`UsageRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub model: String,
    pub question: String,
    pub collection: String,
    pub usage: TokenUsage,
    pub documents_retrieved: usize,
    pub success: bool,
}

/// Sink for token-usage records.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> anyhow::Result<()>;
}

pub struct RagPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn Completion>,
    usage: Option<Arc<dyn UsageRecorder>>,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn Completion>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            usage: None,
            config,
        }
    }

    pub fn with_usage_recorder(mut self, recorder: Arc<dyn UsageRecorder>) -> Self {
        self.usage = Some(recorder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.completion.model_name()
    }

    /// Retrieve and rank documents without calling the completion backend.
    pub async fn retrieve(&self, query: &str, scope: &Scope, top_k: usize) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest("query must not be empty".into()));
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidRequest("top_k must be at least 1".into()));
        }

        let available = self
            .store
            .list_collections()
            .await
            .map_err(|e| RetrievalError::StoreUnavailable(format!("{:#}", e)))?;

        let targets: Vec<String> = match scope {
            Scope::All => available,
            Scope::Collection(name) => {
                if available.iter().any(|c| c == name) {
                    vec![name.clone()]
                } else {
                    info!(collection = %name, "unknown collection");
                    Vec::new()
                }
            }
        };
        if targets.is_empty() {
            return Ok(Retrieval::default());
        }

        let query_vec = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?;

        let opts = SearchOptions {
            top_k,
            ..self.config.search.clone()
        };
        let FanOutResult { documents, summary } = fanout::search_collections(
            self.store.as_ref(),
            &targets,
            query,
            &query_vec,
            &opts,
            self.config.concurrency,
        )
        .await;

        let documents = interleave(documents);
        debug!(
            scope = scope.as_str(),
            documents = documents.len(),
            exact = documents.iter().filter(|d| d.is_exact()).count(),
            "retrieval complete"
        );
        Ok(Retrieval { documents, summary })
    }

    /// Retrieve, ask the completion backend and score the answer.
    ///
    /// Per-collection depth is `max(top_k, min_top_k)`.
    pub async fn answer(&self, question: &str, scope: &Scope, top_k: usize) -> Result<AnswerResponse> {
        let depth = top_k.max(self.config.min_top_k).max(1);
        let Retrieval { documents, summary } = self.retrieve(question, scope, depth).await?;

        if documents.is_empty() {
            info!(scope = scope.as_str(), "no documents retrieved, skipping completion");
            return Ok(AnswerResponse {
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: Vec::new(),
                confidence_score: confidence::combine(confidence::source_confidence(&[], 0), None),
                model: self.completion.model_name().to_string(),
                token_usage: None,
                search_summary: summary,
            });
        }

        let marker = &self.config.confidence_marker;
        let prompt = build_prompt(question, &documents, marker, self.config.content_limit);

        let output = match self.completion.complete(&prompt).await {
            Ok(output) => output,
            Err(e) => {
                self.record(question, scope, TokenUsage::default(), documents.len(), false)
                    .await;
                return Err(RetrievalError::Completion(format!("{:#}", e)));
            }
        };

        let self_report = confidence::parse_self_report(&output.text, marker);
        if self_report.is_none() && output.text.contains(&format!("{}:", marker)) {
            warn!(marker = %marker, "ignoring malformed self-reported confidence");
        }
        let answer = confidence::strip_marker(&output.text, marker);
        let source = confidence::source_confidence(&documents, documents.len());
        let confidence_score = confidence::combine(source, self_report);

        if let Some(usage) = output.usage {
            self.record(question, scope, usage, documents.len(), true)
                .await;
        }

        info!(
            scope = scope.as_str(),
            sources = documents.len(),
            confidence = confidence_score.score,
            level = %confidence_score.level,
            "answered"
        );

        Ok(AnswerResponse {
            answer,
            sources: documents,
            confidence_score,
            model: self.completion.model_name().to_string(),
            token_usage: output.usage,
            search_summary: summary,
        })
    }

    async fn record(
        &self,
        question: &str,
        scope: &Scope,
        usage: TokenUsage,
        documents_retrieved: usize,
        success: bool,
    ) {
        let Some(recorder) = &self.usage else {
            return;
        };
        let record = UsageRecord {
            model: self.completion.model_name().to_string(),
            question: truncate_chars(question, MAX_RECORDED_QUESTION_CHARS),
            collection: scope.as_str().to_string(),
            usage,
            documents_retrieved,
            success,
        };
        if let Err(e) = recorder.record(&record).await {
            warn!(error = %e, "failed to record token usage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionOutput;
    use crate::models::{ConfidenceKind, ConfidenceLevel};
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::{FieldDescriptor, FieldMap};
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.0, 0.0])
        }
    }

    struct ScriptedCompletion {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Completion for ScriptedCompletion {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, prompt: &str) -> anyhow::Result<CompletionOutput> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(CompletionOutput {
                text: self.reply.clone(),
                usage: Some(TokenUsage::new(100, 20, 5)),
            })
        }
    }

    #[derive(Default)]
    struct CollectingRecorder {
        records: Mutex<Vec<UsageRecord>>,
    }

    #[async_trait]
    impl UsageRecorder for CollectingRecorder {
        async fn record(&self, record: &UsageRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn store() -> Arc<InMemoryVectorStore> {
        let store = InMemoryVectorStore::new();
        store.create_collection(
            "notes",
            vec![
                FieldDescriptor::primary("id"),
                FieldDescriptor::text("source_type"),
                FieldDescriptor::text("source_id"),
                FieldDescriptor::text("title"),
                FieldDescriptor::text("content"),
                FieldDescriptor::vector("embedding", 2),
            ],
        );
        let mut fields = FieldMap::new();
        fields.insert("source_type".into(), json!("note"));
        fields.insert("source_id".into(), json!("n1"));
        fields.insert("title".into(), json!("Deploys"));
        fields.insert("content".into(), json!("Deploy with make release"));
        store.insert("notes", fields, vec![0.0, 0.0]).unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(Scope::parse("all"), Scope::All);
        assert_eq!(Scope::parse("all_collections"), Scope::All);
        assert_eq!(Scope::parse("notes"), Scope::Collection("notes".into()));
        assert_eq!(Scope::parse("notes").as_str(), "notes");
    }

    #[tokio::test]
    async fn test_answer_with_self_report() {
        let completion = Arc::new(ScriptedCompletion::new(
            "Run make release.\nANSWER_CONFIDENCE: 0.9",
        ));
        let recorder = Arc::new(CollectingRecorder::default());
        let pipeline = RagPipeline::new(
            store(),
            Arc::new(FixedEmbedder),
            completion.clone(),
            PipelineConfig::default(),
        )
        .with_usage_recorder(recorder.clone());

        let resp = pipeline.answer("how to deploy?", &Scope::All, 5).await.unwrap();
        assert_eq!(resp.answer, "Run make release.");
        assert_eq!(resp.sources.len(), 1);
        assert_eq!(resp.confidence_score.kind, Some(ConfidenceKind::Dual));
        assert_eq!(resp.confidence_score.level, ConfidenceLevel::VeryHigh);
        assert_eq!(completion.calls(), 1);

        let records = recorder.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].collection, "all");
        assert_eq!(records[0].usage.total_tokens, 120);
        assert!(records[0].success);
    }

    #[tokio::test]
    async fn test_unknown_collection_short_circuits() {
        let completion = Arc::new(ScriptedCompletion::new("unused"));
        let pipeline = RagPipeline::new(
            store(),
            Arc::new(FixedEmbedder),
            completion.clone(),
            PipelineConfig::default(),
        );
        let resp = pipeline
            .answer("anything", &Scope::Collection("ghost".into()), 5)
            .await
            .unwrap();
        assert_eq!(resp.answer, NO_RESULTS_ANSWER);
        assert!(resp.sources.is_empty());
        assert_eq!(resp.confidence_score.level, ConfidenceLevel::NoData);
        assert_eq!(resp.confidence_score.kind, Some(ConfidenceKind::SourceOnly));
        assert_eq!(completion.calls(), 0);
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_futures_are_send() {
        let pipeline = RagPipeline::new(
            store(),
            Arc::new(FixedEmbedder),
            Arc::new(ScriptedCompletion::new("")),
            PipelineConfig::default(),
        );
        let scope = Scope::All;
        assert_send(pipeline.retrieve("deploy", &scope, 5));
        assert_send(pipeline.answer("deploy", &scope, 5));
    }

    #[tokio::test]
    async fn test_rejects_empty_query() {
        let pipeline = RagPipeline::new(
            store(),
            Arc::new(FixedEmbedder),
            Arc::new(ScriptedCompletion::new("")),
            PipelineConfig::default(),
        );
        let err = pipeline.retrieve("  ", &Scope::All, 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidRequest(_)));
    }
}
