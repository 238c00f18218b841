//! `ragfuse search`: retrieval without an LLM call.

use anyhow::Result;

use ragfuse_core::models::Document;
use ragfuse_core::pipeline::Scope;
use ragfuse_core::schema::truncate_chars;

use crate::app::AppContext;
use crate::config::Config;

const EXCERPT_CHARS: usize = 160;

pub async fn run_search(
    config: &Config,
    query: &str,
    collection: &str,
    top_k: Option<usize>,
    show_summary: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let ctx = AppContext::open(config, false).await?;
    let scope = Scope::parse(collection);
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let retrieval = ctx.pipeline().retrieve(query, &scope, top_k).await?;

    if show_summary {
        for entry in &retrieval.summary {
            println!("  {}", entry);
        }
        println!();
    }

    if retrieval.documents.is_empty() {
        println!("No results.");
    } else {
        for (i, doc) in retrieval.documents.iter().enumerate() {
            print_document(i + 1, doc);
        }
    }

    ctx.close().await;
    Ok(())
}

pub(crate) fn print_document(rank: usize, doc: &Document) {
    println!(
        "{}. [{:.4}] {} / {} ({})",
        rank, doc.score, doc.collection, doc.source_type, doc.match_type
    );
    println!("    title: {}", doc.title);
    if !doc.source_id.is_empty() {
        println!("    source_id: {}", doc.source_id);
    }
    if let Some(url) = doc.url.as_deref().filter(|u| !u.is_empty()) {
        println!("    url: {}", url);
    }
    println!(
        "    excerpt: \"{}\"",
        truncate_chars(&doc.content, EXCERPT_CHARS)
            .replace('\n', " ")
            .trim()
    );
    println!();
}
