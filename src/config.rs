//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/ragfuse.sqlite"
//!
//! [retrieval]
//! top_k = 5
//! exact_match_collections = ["jira_tickets", "jira_issues"]
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [llm]
//! provider = "anthropic"
//! model = "claude-sonnet-4-5"
//! ```
//!
//! Every section except `[db]` is optional. Secrets are read from the
//! environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`), never from the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ragfuse_core::pipeline::PipelineConfig;
use ragfuse_core::search::SearchOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub usage: UsageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_top_k")]
    pub min_top_k: usize,
    #[serde(default = "default_candidate_list")]
    pub candidate_list: usize,
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
    #[serde(default = "default_exact_match_collections")]
    pub exact_match_collections: Vec<String>,
    #[serde(default = "default_confidence_marker")]
    pub confidence_marker: String,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_top_k: default_min_top_k(),
            candidate_list: default_candidate_list(),
            content_limit: default_content_limit(),
            exact_match_collections: default_exact_match_collections(),
            confidence_marker: default_confidence_marker(),
            vector_field: default_vector_field(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_top_k() -> usize {
    7
}
fn default_candidate_list() -> usize {
    10
}
fn default_content_limit() -> usize {
    1000
}
fn default_exact_match_collections() -> Vec<String> {
    vec!["jira_tickets".to_string(), "jira_issues".to_string()]
}
fn default_confidence_marker() -> String {
    "ANSWER_CONFIDENCE".to_string()
}
fn default_vector_field() -> String {
    "embedding".to_string()
}
fn default_concurrency() -> usize {
    4
}

impl RetrievalConfig {
    pub fn search_options(&self, top_k: usize) -> SearchOptions {
        SearchOptions {
            top_k,
            candidate_list: self.candidate_list,
            vector_field: self.vector_field.clone(),
            exact_match_collections: self.exact_match_collections.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            search: self.search_options(self.top_k),
            min_top_k: self.min_top_k,
            content_limit: self.content_limit,
            confidence_marker: self.confidence_marker.clone(),
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Query embeddings kept in memory; `0` disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_capacity() -> usize {
    1024
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_max_tokens() -> u32 {
    4000
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_llm_max_retries() -> u32 {
    2
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// USD per million tokens.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UsageConfig {
    #[serde(default = "default_usage_enabled")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_pricing")]
    pub pricing: BTreeMap<String, ModelPricing>,
    /// Pricing entry used for models missing from `pricing`.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            enabled: default_usage_enabled(),
            retention_days: default_retention_days(),
            pricing: default_pricing(),
            fallback_model: default_fallback_model(),
        }
    }
}

fn default_usage_enabled() -> bool {
    true
}
fn default_retention_days() -> u32 {
    90
}
fn default_fallback_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_pricing() -> BTreeMap<String, ModelPricing> {
    BTreeMap::from([
        (
            "claude-sonnet-4-5".to_string(),
            ModelPricing {
                input: 3.0,
                output: 15.0,
            },
        ),
        (
            "claude-opus-4".to_string(),
            ModelPricing {
                input: 15.0,
                output: 75.0,
            },
        ),
        (
            "claude-haiku-4".to_string(),
            ModelPricing {
                input: 0.25,
                output: 1.25,
            },
        ),
    ])
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if r.candidate_list == 0 {
        anyhow::bail!("retrieval.candidate_list must be >= 1");
    }
    if r.content_limit == 0 {
        anyhow::bail!("retrieval.content_limit must be > 0");
    }
    if r.concurrency == 0 {
        anyhow::bail!("retrieval.concurrency must be >= 1");
    }
    if r.confidence_marker.trim().is_empty() || r.confidence_marker.contains(':') {
        anyhow::bail!("retrieval.confidence_marker must be non-empty and must not contain ':'");
    }

    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "anthropic" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, anthropic, or ollama.",
            other
        ),
    }
    if config.llm.provider == "ollama" && config.llm.model.is_none() {
        anyhow::bail!("llm.model must be specified when provider is 'ollama'");
    }

    if config.usage.retention_days == 0 {
        anyhow::bail!("usage.retention_days must be >= 1");
    }

    Ok(())
}
