//! Idempotent schema migrations.
//!
//! | Table | Holds |
//! |-------|-------|
//! | `collections` | one row per vector collection |
//! | `collection_fields` | declared fields, in declaration order |
//! | `entities` | field values as JSON plus the vector as a little-endian f32 BLOB |
//! | `token_usage` | one row per answered query |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index that does not exist yet.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_fields (
            collection TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            field_type TEXT NOT NULL,
            dim INTEGER,
            is_primary INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (collection, position),
            UNIQUE (collection, name),
            FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            fields_json TEXT NOT NULL,
            vector BLOB NOT NULL,
            dedup_hash TEXT,
            FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS token_usage (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            model TEXT NOT NULL,
            question TEXT NOT NULL,
            collection TEXT NOT NULL,
            input_tokens INTEGER NOT NULL,
            output_tokens INTEGER NOT NULL,
            total_tokens INTEGER NOT NULL,
            cost_usd REAL NOT NULL,
            documents_retrieved INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            success INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_collection ON entities(collection)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_token_usage_timestamp ON token_usage(timestamp DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
