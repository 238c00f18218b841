//! Exact-match lookup on structured identifiers.
//!
//! Ticket-style keys (`PROJ-123`) in a query are looked up by equality on
//! `source_id` before any similarity search runs. Only collections that are
//! known to carry such keys are eligible.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{Document, MatchType};
use crate::schema::SchemaMapping;
use crate::store::{Filter, VectorStore};

/// Field the identifier is matched against.
pub const IDENTIFIER_FIELD: &str = "source_id";

static IDENTIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[A-Z]+-\d+").ok());

/// First identifier-looking token in the query, in reading order.
pub fn detect_identifier(query: &str) -> Option<&str> {
    IDENTIFIER
        .as_ref()
        .and_then(|re| re.find(query))
        .map(|m| m.as_str())
}

/// Whether exact lookup should be attempted for this collection.
pub fn is_applicable(collection: &str, mapping: &SchemaMapping, eligible: &[String]) -> bool {
    eligible.iter().any(|c| c == collection) && mapping.has_field(IDENTIFIER_FIELD)
}

/// Look up the identifier found in `query`.
///
/// Returns `None` when no identifier is present, when nothing matches, or
/// when the store fails; the caller then falls back to similarity search.
pub async fn lookup(
    store: &dyn VectorStore,
    collection: &str,
    mapping: &SchemaMapping,
    query: &str,
) -> Option<Document> {
    let id = detect_identifier(query)?;
    let filter = Filter::eq(IDENTIFIER_FIELD, id);

    match store
        .exact_query(collection, &filter, &mapping.output_fields, 1)
        .await
    {
        Ok(rows) => {
            let row = rows.into_iter().next()?;
            debug!(collection = %collection, identifier = %id, "exact match");
            Some(mapping.normalize(collection, &row, 1.0, MatchType::Exact))
        }
        Err(e) => {
            warn!(collection = %collection, filter = %filter, error = %e, "exact lookup failed");
            None
        }
    }
}
