//! Completion backends.
//!
//! | `provider` | Backend | Endpoint |
//! |------------|---------|----------|
//! | `"disabled"` | [`DisabledCompletion`] | none |
//! | `"anthropic"` | [`AnthropicCompletion`] | `POST {ANTHROPIC_BASE_URL}/v1/messages` |
//! | `"ollama"` | [`OllamaCompletion`] | `POST {url}/api/generate` |
//!
//! Both network backends report token usage and wall-clock response time.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragfuse_core::completion::{Completion, CompletionOutput};
use ragfuse_core::models::TokenUsage;

use crate::config::LlmConfig;
use crate::http::send_json_with_retry;

const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

pub struct DisabledCompletion;

#[async_trait]
impl Completion for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<CompletionOutput> {
        bail!("LLM provider is disabled. Set [llm] provider in config.")
    }
}

// ============ Anthropic ============

/// Requires `ANTHROPIC_API_KEY`; honours `ANTHROPIC_BASE_URL`.
pub struct AnthropicCompletion {
    model: String,
    max_tokens: u32,
    max_retries: u32,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicCompletion {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        let base_url = config
            .url
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_URL.to_string());

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl Completion for AnthropicCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<CompletionOutput> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let endpoint = format!("{}/v1/messages", self.base_url);

        let start = Instant::now();
        let json = send_json_with_retry("Anthropic", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
        })
        .await?;
        parse_anthropic_response(&json, elapsed_ms(start))
    }
}

fn parse_anthropic_response(json: &serde_json::Value, response_time_ms: u64) -> Result<CompletionOutput> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid Anthropic response: missing content"))?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        bail!("Invalid Anthropic response: no text content");
    }

    let usage = json.get("usage").map(|u| {
        TokenUsage::new(
            u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            response_time_ms,
        )
    });

    Ok(CompletionOutput { text, usage })
}

// ============ Ollama ============

pub struct OllamaCompletion {
    model: String,
    url: String,
    max_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaCompletion {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl Completion for OllamaCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<CompletionOutput> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": self.max_tokens },
        });
        let endpoint = format!("{}/api/generate", self.url);

        let start = Instant::now();
        let json = send_json_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .map_err(|e| anyhow!("{:#} (is Ollama running at {}?)", e, self.url))?;
        parse_ollama_response(&json, elapsed_ms(start))
    }
}

fn parse_ollama_response(json: &serde_json::Value, response_time_ms: u64) -> Result<CompletionOutput> {
    let text = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response text"))?
        .to_string();

    let input = json.get("prompt_eval_count").and_then(|v| v.as_u64());
    let output = json.get("eval_count").and_then(|v| v.as_u64());
    let usage = match (input, output) {
        (None, None) => None,
        (i, o) => Some(TokenUsage::new(
            i.unwrap_or(0),
            o.unwrap_or(0),
            response_time_ms,
        )),
    };

    Ok(CompletionOutput { text, usage })
}

pub fn create_completion(config: &LlmConfig) -> Result<Arc<dyn Completion>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "anthropic" => Ok(Arc::new(AnthropicCompletion::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaCompletion::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
