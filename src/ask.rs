//! `ragfuse ask`: retrieve, answer and score.

use anyhow::Result;

use ragfuse_core::models::{AnswerResponse, ConfidenceKind};
use ragfuse_core::pipeline::Scope;

use crate::app::AppContext;
use crate::config::Config;
use crate::search::print_document;

pub async fn run_ask(
    config: &Config,
    question: &str,
    collection: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let ctx = AppContext::open(config, true).await?;
    let scope = Scope::parse(collection);
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let response = ctx.pipeline().answer(question, &scope, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_answer(&response);
    }

    ctx.close().await;
    Ok(())
}

fn print_answer(response: &AnswerResponse) {
    println!("{}", response.answer);
    println!();

    let confidence = &response.confidence_score;
    match confidence.kind {
        Some(ConfidenceKind::Dual) => {
            let source = confidence
                .source_confidence
                .as_ref()
                .map(|s| format!("{:.3} ({})", s.score, s.level))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "Confidence: {} {:.2} (sources: {})",
                confidence.level, confidence.score, source
            );
        }
        _ => println!(
            "Confidence: {} {:.3} (sources only)",
            confidence.level, confidence.score
        ),
    }
    if let Some(usage) = &response.token_usage {
        println!(
            "Model: {}  tokens: {} in / {} out  ({} ms)",
            response.model, usage.input_tokens, usage.output_tokens, usage.response_time_ms
        );
    }

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, doc) in response.sources.iter().enumerate() {
            print_document(i + 1, doc);
        }
    }
}
