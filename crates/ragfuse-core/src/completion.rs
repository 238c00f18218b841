//! LLM completion trait.
//!
//! Concrete backends (Anthropic, Ollama) live in the `ragfuse` app crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::TokenUsage;

/// Text produced by a completion backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutput {
    /// Raw answer text; may contain a self-reported confidence marker line.
    pub text: String,
    /// Token accounting, when the backend reports it.
    pub usage: Option<TokenUsage>,
}

impl CompletionOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Prompt → answer text.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Model identifier reported in responses and usage records.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<CompletionOutput>;
}
