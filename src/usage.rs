//! Token usage and cost tracking.
//!
//! [`TokenTracker`] is constructed once at startup and handed to the
//! pipeline as its [`UsageRecorder`]. Every answered query becomes one
//! `token_usage` row with its cost computed from the `[usage.pricing]`
//! table (USD per million tokens). Unknown models are priced like the
//! configured fallback model.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use ragfuse_core::pipeline::{UsageRecord, UsageRecorder, MAX_RECORDED_QUESTION_CHARS};
use ragfuse_core::schema::truncate_chars;

use crate::config::{ModelPricing, UsageConfig};

/// Reporting window for usage queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Since midnight UTC.
    Today,
    /// Last 7 days.
    Week,
    /// Last 30 days.
    Month,
    All,
}

impl Period {
    /// Earliest timestamp included, or `None` for no lower bound.
    pub fn since(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            Period::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc().timestamp()),
            Period::Week => Some((now - Duration::days(7)).timestamp()),
            Period::Month => Some((now - Duration::days(30)).timestamp()),
            Period::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::All => "all",
        }
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "all" => Ok(Period::All),
            other => bail!("Unknown period: '{}'. Use today, week, month, or all.", other),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrackedUsage {
    pub id: String,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UsageSummary {
    pub total_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub total_documents: i64,
    pub avg_response_time_ms: f64,
    pub successful_requests: i64,
    pub failed_requests: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Breakdown {
    pub key: String,
    pub requests: i64,
    pub tokens: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecentQuery {
    pub id: String,
    pub timestamp: String,
    pub model: String,
    pub question: String,
    pub collection: String,
    pub total_tokens: i64,
    pub cost_usd: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub period: String,
    pub summary: UsageSummary,
    pub recent_queries: Vec<RecentQuery>,
    pub model_breakdown: Vec<Breakdown>,
    pub collection_breakdown: Vec<Breakdown>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyCost {
    pub date: String,
    pub requests: i64,
    pub tokens: i64,
    pub cost: f64,
}

pub struct TokenTracker {
    pool: SqlitePool,
    pricing: BTreeMap<String, ModelPricing>,
    fallback_model: String,
}

impl TokenTracker {
    pub fn new(pool: SqlitePool, config: &UsageConfig) -> Self {
        Self {
            pool,
            pricing: config.pricing.clone(),
            fallback_model: config.fallback_model.clone(),
        }
    }

    /// USD cost of one call.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let rates = self
            .pricing
            .get(model)
            .or_else(|| self.pricing.get(&self.fallback_model));
        match rates {
            Some(r) => {
                (input_tokens as f64 / 1_000_000.0) * r.input
                    + (output_tokens as f64 / 1_000_000.0) * r.output
            }
            None => 0.0,
        }
    }

    pub async fn track(&self, record: &UsageRecord) -> Result<TrackedUsage> {
        self.track_at(record, Utc::now()).await
    }

    /// Store a record with an explicit timestamp.
    pub async fn track_at(&self, record: &UsageRecord, at: DateTime<Utc>) -> Result<TrackedUsage> {
        let id = Uuid::new_v4().to_string();
        let usage = &record.usage;
        let cost = self.cost(&record.model, usage.input_tokens, usage.output_tokens);

        sqlx::query(
            r#"
            INSERT INTO token_usage
                (id, timestamp, model, question, collection, input_tokens, output_tokens,
                 total_tokens, cost_usd, documents_retrieved, response_time_ms, success)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(at.timestamp())
        .bind(&record.model)
        .bind(truncate_chars(&record.question, MAX_RECORDED_QUESTION_CHARS))
        .bind(&record.collection)
        .bind(usage.input_tokens as i64)
        .bind(usage.output_tokens as i64)
        .bind(usage.total_tokens as i64)
        .bind(cost)
        .bind(record.documents_retrieved as i64)
        .bind(usage.response_time_ms as i64)
        .bind(record.success)
        .execute(&self.pool)
        .await?;

        tracing::debug!(tokens = usage.total_tokens, cost_usd = cost, "tracked usage");
        Ok(TrackedUsage {
            id,
            total_tokens: usage.total_tokens,
            cost_usd: cost,
        })
    }

    pub async fn stats(&self, period: Period, recent_limit: usize) -> Result<UsageStats> {
        let since = period.since(Utc::now()).unwrap_or(i64::MIN);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_requests,
                COALESCE(SUM(input_tokens), 0) AS total_input_tokens,
                COALESCE(SUM(output_tokens), 0) AS total_output_tokens,
                COALESCE(SUM(total_tokens), 0) AS total_tokens,
                COALESCE(SUM(cost_usd), 0.0) AS total_cost,
                COALESCE(SUM(documents_retrieved), 0) AS total_documents,
                COALESCE(AVG(response_time_ms), 0.0) AS avg_response_time_ms,
                COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0) AS successful_requests,
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0) AS failed_requests
            FROM token_usage
            WHERE timestamp >= ?
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let summary = UsageSummary {
            total_requests: row.get("total_requests"),
            total_input_tokens: row.get("total_input_tokens"),
            total_output_tokens: row.get("total_output_tokens"),
            total_tokens: row.get("total_tokens"),
            total_cost: row.get("total_cost"),
            total_documents: row.get("total_documents"),
            avg_response_time_ms: row.get("avg_response_time_ms"),
            successful_requests: row.get("successful_requests"),
            failed_requests: row.get("failed_requests"),
        };

        let recent_queries = sqlx::query(
            r#"
            SELECT id, timestamp, model, question, collection, total_tokens, cost_usd, success
            FROM token_usage
            WHERE timestamp >= ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(recent_limit as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| RecentQuery {
            id: r.get("id"),
            timestamp: format_timestamp(r.get("timestamp")),
            model: r.get("model"),
            question: r.get("question"),
            collection: r.get("collection"),
            total_tokens: r.get("total_tokens"),
            cost_usd: r.get("cost_usd"),
            success: r.get("success"),
        })
        .collect();

        Ok(UsageStats {
            period: period.to_string(),
            summary,
            recent_queries,
            model_breakdown: self.breakdown("model", since).await?,
            collection_breakdown: self.breakdown("collection", since).await?,
        })
    }

    async fn breakdown(&self, column: &'static str, since: i64) -> Result<Vec<Breakdown>> {
        let sql = format!(
            "SELECT {col} AS bucket, COUNT(*) AS requests, \
             COALESCE(SUM(total_tokens), 0) AS tokens, COALESCE(SUM(cost_usd), 0.0) AS cost \
             FROM token_usage WHERE timestamp >= ? GROUP BY {col} ORDER BY cost DESC, bucket",
            col = column
        );
        let rows = sqlx::query(&sql).bind(since).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| Breakdown {
                key: r.get("bucket"),
                requests: r.get("requests"),
                tokens: r.get("tokens"),
                cost: r.get("cost"),
            })
            .collect())
    }

    /// Cost per UTC day, newest first.
    pub async fn daily_costs(&self, period: Period) -> Result<Vec<DailyCost>> {
        let since = period.since(Utc::now()).unwrap_or(i64::MIN);
        let rows = sqlx::query(
            r#"
            SELECT
                date(timestamp, 'unixepoch') AS day,
                COUNT(*) AS requests,
                COALESCE(SUM(total_tokens), 0) AS tokens,
                COALESCE(SUM(cost_usd), 0.0) AS cost
            FROM token_usage
            WHERE timestamp >= ?
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DailyCost {
                date: r.get("day"),
                requests: r.get("requests"),
                tokens: r.get("tokens"),
                cost: r.get("cost"),
            })
            .collect())
    }

    /// Delete records older than `days` days; returns how many went.
    pub async fn prune(&self, days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(days as i64)).timestamp();
        let result = sqlx::query("DELETE FROM token_usage WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        tracing::info!(deleted = result.rows_affected(), days, "pruned token usage");
        Ok(result.rows_affected())
    }
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[async_trait]
impl UsageRecorder for TokenTracker {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        self.track(record).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse_and_since() {
        assert_eq!("week".parse::<Period>().unwrap(), Period::Week);
        assert!("year".parse::<Period>().is_err());

        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap();
        assert_eq!(
            Period::Today.since(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap().timestamp())
        );
        assert_eq!(
            Period::Week.since(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 15, 30, 0).unwrap().timestamp())
        );
        assert_eq!(Period::All.since(now), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
