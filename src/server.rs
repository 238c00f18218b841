//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/collections` | Collections with entity counts and dimensions |
//! | `POST` | `/search` | `{query, collection?, top_k?}` → `{documents, summary}` |
//! | `POST` | `/ask` | `{question, collection?, top_k?}` → answer envelope |
//! | `POST` | `/index` | Index one document into a RAG collection |
//! | `GET`  | `/usage/stats?period=` | Token usage summary and breakdowns |
//! | `GET`  | `/usage/costs?period=` | Cost per day |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "store_unavailable", "message": "..." } }
//! ```
//!
//! Codes: `bad_request` (400), `embeddings_disabled` (400), `not_found`
//! (404), `upstream_error` (502), `store_unavailable` (503), `internal`
//! (500). A query that finds nothing is a 200 with empty sources.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ragfuse_core::error::RetrievalError;
use ragfuse_core::models::AnswerResponse;
use ragfuse_core::pipeline::{Retrieval, Scope};

use crate::app::AppContext;
use crate::collections::{list_collections, CollectionInfo};
use crate::config::Config;
use crate::ingest::{index_document, IndexOutcome, IndexRequest};
use crate::usage::{DailyCost, Period, UsageStats};

/// Number of recent queries returned by `/usage/stats`.
const RECENT_QUERY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    ctx: Arc<AppContext>,
}

impl AppState {
    pub fn new(config: Arc<Config>, ctx: Arc<AppContext>) -> Self {
        Self { config, ctx }
    }
}

/// Bind to `[server] bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = Arc::new(AppContext::open(config, true).await?);
    let app = router(AppState::new(Arc::new(config.clone()), ctx));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("ragfuse listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/collections", get(handle_collections))
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .route("/index", post(handle_index))
        .route("/usage/stats", get(handle_usage_stats))
        .route("/usage/costs", get(handle_usage_costs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn embeddings_disabled(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "embeddings_disabled", message)
}

fn internal(err: anyhow::Error) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("{:#}", err))
}

fn classify_retrieval_error(err: RetrievalError, embeddings_enabled: bool) -> AppError {
    let message = err.to_string();
    match err {
        RetrievalError::StoreUnavailable(_) => {
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
        }
        RetrievalError::InvalidRequest(_) => bad_request(message),
        RetrievalError::Embedding(_) if !embeddings_enabled => embeddings_disabled(message),
        RetrievalError::Embedding(_) | RetrievalError::Completion(_) => {
            AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
        }
    }
}

/// Indexing reports plain `anyhow` errors; validation failures are
/// recognised by message.
fn classify_index_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    if message.contains("requires embeddings") {
        embeddings_disabled(message)
    } else if message.contains("must not be empty")
        || message.contains("cannot be indexed")
        || message.contains("has dimension")
    {
        bad_request(message)
    } else if message.contains("Failed to embed") {
        AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
    } else {
        internal(err)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /collections ============

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<CollectionInfo>,
}

async fn handle_collections(
    State(state): State<AppState>,
) -> Result<Json<CollectionsResponse>, AppError> {
    let collections = list_collections(state.ctx.store(), &state.config.retrieval.vector_field)
        .await
        .map_err(|e| {
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", format!("{:#}", e))
        })?;
    Ok(Json(CollectionsResponse { collections }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Retrieval>, AppError> {
    let scope = Scope::parse(req.collection.as_deref().unwrap_or("all"));
    let top_k = req.top_k.unwrap_or(state.config.retrieval.top_k);
    let retrieval = state
        .ctx
        .pipeline()
        .retrieve(&req.query, &scope, top_k)
        .await
        .map_err(|e| classify_retrieval_error(e, state.config.embedding.is_enabled()))?;
    Ok(Json(retrieval))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    let scope = Scope::parse(req.collection.as_deref().unwrap_or("all"));
    let top_k = req.top_k.unwrap_or(state.config.retrieval.top_k);
    let response = state
        .ctx
        .pipeline()
        .answer(&req.question, &scope, top_k)
        .await
        .map_err(|e| classify_retrieval_error(e, state.config.embedding.is_enabled()))?;
    Ok(Json(response))
}

// ============ POST /index ============

async fn handle_index(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexOutcome>, AppError> {
    let outcome = index_document(state.ctx.store(), state.ctx.embedder(), &req)
        .await
        .map_err(classify_index_error)?;
    Ok(Json(outcome))
}

// ============ GET /usage/* ============

#[derive(Deserialize)]
struct PeriodParams {
    #[serde(default)]
    period: Option<String>,
}

impl PeriodParams {
    fn period(&self, default: Period) -> Result<Period, AppError> {
        match &self.period {
            Some(p) => p.parse().map_err(|e: anyhow::Error| bad_request(e.to_string())),
            None => Ok(default),
        }
    }
}

async fn handle_usage_stats(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<UsageStats>, AppError> {
    let period = params.period(Period::Today)?;
    let tracker = state
        .ctx
        .tracker()
        .ok_or_else(|| not_found("usage tracking is disabled"))?;
    let stats = tracker
        .stats(period, RECENT_QUERY_LIMIT)
        .await
        .map_err(internal)?;
    Ok(Json(stats))
}

#[derive(Serialize)]
struct CostsResponse {
    period: String,
    days: Vec<DailyCost>,
}

async fn handle_usage_costs(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<CostsResponse>, AppError> {
    let period = params.period(Period::Month)?;
    let tracker = state
        .ctx
        .tracker()
        .ok_or_else(|| not_found("usage tracking is disabled"))?;
    let days = tracker.daily_costs(period).await.map_err(internal)?;
    Ok(Json(CostsResponse {
        period: period.to_string(),
        days,
    }))
}
