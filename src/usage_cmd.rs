//! `ragfuse usage` subcommands.

use anyhow::{anyhow, bail, Result};

use crate::app::AppContext;
use crate::config::Config;
use crate::usage::{Breakdown, Period, TokenTracker, UsageStats};

const RECENT_SHOWN: usize = 10;

async fn open(config: &Config) -> Result<AppContext> {
    if !config.usage.enabled {
        bail!("Usage tracking is disabled. Set [usage] enabled = true in config.");
    }
    AppContext::open(config, false).await
}

fn tracker(ctx: &AppContext) -> Result<&TokenTracker> {
    ctx.tracker()
        .ok_or_else(|| anyhow!("Usage tracking is disabled."))
}

pub async fn run_stats(config: &Config, period: Period) -> Result<()> {
    let ctx = open(config).await?;
    let stats = tracker(&ctx)?.stats(period, RECENT_SHOWN).await?;
    ctx.close().await;

    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &UsageStats) {
    let s = &stats.summary;
    println!("Token usage ({})", stats.period);
    println!("=====================");
    println!();
    println!(
        "  Requests:      {} ({} ok, {} failed)",
        s.total_requests, s.successful_requests, s.failed_requests
    );
    println!("  Input tokens:  {}", s.total_input_tokens);
    println!("  Output tokens: {}", s.total_output_tokens);
    println!("  Total tokens:  {}", s.total_tokens);
    println!("  Cost:          ${:.4}", s.total_cost);
    println!("  Documents:     {}", s.total_documents);
    println!("  Avg response:  {:.0} ms", s.avg_response_time_ms);

    print_breakdown("By model", &stats.model_breakdown);
    print_breakdown("By collection", &stats.collection_breakdown);

    if !stats.recent_queries.is_empty() {
        println!();
        println!("  Recent:");
        for q in &stats.recent_queries {
            let status = if q.success { "ok" } else { "failed" };
            println!(
                "  {}  {:<6} {:>7} tok  ${:.4}  {}",
                q.timestamp, status, q.total_tokens, q.cost_usd, q.question
            );
        }
    }
    println!();
}

fn print_breakdown(title: &str, rows: &[Breakdown]) {
    if rows.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    println!("  {:<28} {:>8} {:>10} {:>10}", "KEY", "REQUESTS", "TOKENS", "COST");
    println!("  {}", "-".repeat(60));
    for row in rows {
        println!(
            "  {:<28} {:>8} {:>10} {:>10.4}",
            row.key, row.requests, row.tokens, row.cost
        );
    }
}

pub async fn run_costs(config: &Config, period: Period) -> Result<()> {
    let ctx = open(config).await?;
    let days = tracker(&ctx)?.daily_costs(period).await?;
    ctx.close().await;

    if days.is_empty() {
        println!("No usage recorded ({}).", period);
        return Ok(());
    }
    println!("{:<12} {:>8} {:>10} {:>10}", "DATE", "REQUESTS", "TOKENS", "COST");
    for day in &days {
        println!(
            "{:<12} {:>8} {:>10} {:>10.4}",
            day.date, day.requests, day.tokens, day.cost
        );
    }
    let total: f64 = days.iter().map(|d| d.cost).sum();
    println!("{:<12} {:>30.4}", "TOTAL", total);
    Ok(())
}

pub async fn run_prune(config: &Config, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(config.usage.retention_days);
    if days == 0 {
        bail!("--days must be >= 1");
    }
    let ctx = open(config).await?;
    let deleted = tracker(&ctx)?.prune(days).await?;
    ctx.close().await;

    println!("Deleted {} usage record(s) older than {} days.", deleted, days);
    Ok(())
}
