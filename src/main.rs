//! # ragfuse CLI
//!
//! ```bash
//! ragfuse --config ./config/ragfuse.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragfuse init` | Create the SQLite database and run schema migrations |
//! | `ragfuse collections` | List collections with entity counts and dimensions |
//! | `ragfuse index <collection> <source_id> <file>` | Index one document |
//! | `ragfuse search "<query>"` | Retrieve and rank documents across collections |
//! | `ragfuse ask "<question>"` | Answer a question with confidence scoring |
//! | `ragfuse serve` | Start the HTTP API |
//! | `ragfuse usage stats\|costs\|prune` | Token usage reporting and retention |
//!
//! Diagnostics go to stderr; set `RAGFUSE_LOG=debug` for per-collection detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragfuse::ingest::IndexArgs;
use ragfuse::usage::Period;
use ragfuse::{ask, collections, config, ingest, logging, migrate, search, server, usage_cmd};

#[derive(Parser)]
#[command(
    name = "ragfuse",
    about = "Multi-collection hybrid retrieval and answer fusion",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragfuse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List collections with entity counts and vector dimensions.
    Collections,

    /// Index a text file into a RAG collection.
    ///
    /// The collection is created on first use. Re-indexing the same
    /// source id replaces the stored document.
    Index {
        collection: String,
        source_id: String,
        /// File whose contents become the document body.
        file: PathBuf,
        #[arg(long, default_value = "document")]
        source_type: String,
        /// Defaults to the file name without extension.
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },

    /// Retrieve documents without calling the LLM.
    Search {
        query: String,
        /// Collection name, or `all` to search every collection.
        #[arg(long, default_value = "all")]
        collection: String,
        /// Results per collection (defaults to `[retrieval] top_k`).
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the per-collection search summary.
        #[arg(long)]
        summary: bool,
    },

    /// Answer a question from the indexed collections.
    Ask {
        question: String,
        #[arg(long, default_value = "all")]
        collection: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the full response envelope as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API on `[server] bind`.
    Serve,

    /// Token usage and cost reporting.
    Usage {
        #[command(subcommand)]
        action: UsageAction,
    },
}

#[derive(Subcommand)]
enum UsageAction {
    /// Usage summary with model and collection breakdowns.
    Stats {
        /// `today`, `week`, `month` or `all`.
        #[arg(long, default_value = "today")]
        period: Period,
    },
    /// Cost per day.
    Costs {
        #[arg(long, default_value = "month")]
        period: Period,
    },
    /// Delete usage records older than the retention window.
    Prune {
        /// Defaults to `[usage] retention_days`.
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Collections => {
            collections::run_collections(&cfg).await?;
        }
        Commands::Index {
            collection,
            source_id,
            file,
            source_type,
            title,
            url,
        } => {
            ingest::run_index(
                &cfg,
                IndexArgs {
                    collection,
                    source_id,
                    source_type,
                    title,
                    file,
                    url,
                },
            )
            .await?;
        }
        Commands::Search {
            query,
            collection,
            top_k,
            summary,
        } => {
            search::run_search(&cfg, &query, &collection, top_k, summary).await?;
        }
        Commands::Ask {
            question,
            collection,
            top_k,
            json,
        } => {
            ask::run_ask(&cfg, &question, &collection, top_k, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Usage { action } => match action {
            UsageAction::Stats { period } => usage_cmd::run_stats(&cfg, period).await?,
            UsageAction::Costs { period } => usage_cmd::run_costs(&cfg, period).await?,
            UsageAction::Prune { days } => usage_cmd::run_prune(&cfg, days).await?,
        },
    }

    Ok(())
}
