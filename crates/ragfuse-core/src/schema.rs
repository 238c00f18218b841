//! Schema resolution: which fields to fetch from a collection and how to
//! turn a raw entity into a [`Document`].
//!
//! Collections written by different ingesters expose different field sets.
//! [`resolve`] walks an ordered table of [`SchemaRule`]s; each rule is a
//! predicate over the available field names plus an extractor. The first
//! matching rule wins. Unknown schemas fall back to a generic mapping and
//! never fail.
//!
//! | Signature | Kind |
//! |-----------|------|
//! | `source_type` | [`SchemaKind::RagDocument`] |
//! | `file_path` + `content` | [`SchemaKind::Code`] |
//! | `action_type` + `endpoint` | [`SchemaKind::ActionLog`] |
//! | `username` + `persona_description` | [`SchemaKind::Persona`] |
//! | `repo_name` + `total_files_found` | [`SchemaKind::Audit`] |
//! | anything else | [`SchemaKind::Generic`] |

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::models::{Document, MatchType};
use crate::store::{FieldDescriptor, FieldMap};

/// Which family of collection a schema belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    RagDocument,
    Code,
    ActionLog,
    Persona,
    Audit,
    Generic,
}

type Extractor = fn(&mut Document, &FieldMap, &SchemaMapping);

/// One row of the resolution table.
pub struct SchemaRule {
    pub kind: SchemaKind,
    /// Every one of these fields must be present for the rule to match.
    pub signature: &'static [&'static str],
    pub output_fields: &'static [&'static str],
    /// Maximum number of characters of content kept per document.
    pub content_limit: usize,
    extract: Extractor,
}

impl SchemaRule {
    fn matches(&self, available: &BTreeSet<&str>) -> bool {
        self.signature.iter().all(|f| available.contains(f))
    }
}

pub const RULES: &[SchemaRule] = &[
    SchemaRule {
        kind: SchemaKind::RagDocument,
        signature: &["source_type"],
        output_fields: &["source_type", "source_id", "title", "content", "metadata", "url"],
        content_limit: 2000,
        extract: extract_rag_document,
    },
    SchemaRule {
        kind: SchemaKind::Code,
        signature: &["file_path", "content"],
        output_fields: &[
            "file_path",
            "file_name",
            "language",
            "content",
            "content_summary",
            "functions",
            "classes",
            "repo_name",
            "github_url",
        ],
        content_limit: 1000,
        extract: extract_code,
    },
    SchemaRule {
        kind: SchemaKind::ActionLog,
        signature: &["action_type", "endpoint"],
        output_fields: &[
            "action_type",
            "endpoint",
            "parameters",
            "status",
            "result_summary",
            "error_message",
            "metadata",
        ],
        content_limit: 1000,
        extract: extract_action_log,
    },
    SchemaRule {
        kind: SchemaKind::Persona,
        signature: &["username", "persona_description"],
        output_fields: &[
            "username",
            "display_name",
            "role",
            "persona_description",
            "statistics",
            "patterns",
        ],
        content_limit: 2000,
        extract: extract_persona,
    },
    SchemaRule {
        kind: SchemaKind::Audit,
        signature: &["repo_name", "total_files_found"],
        output_fields: &[
            "repo_name",
            "repo_path",
            "total_files_found",
            "files_analyzed",
            "status",
            "processing_time_seconds",
        ],
        content_limit: 500,
        extract: extract_audit,
    },
];

/// Generic field names tried, in order, when no rule matches.
pub const GENERIC_FIELD_PRIORITY: &[&str] =
    &["content", "title", "file_path", "action_type", "username", "repo_name"];

const GENERIC_CONTENT_LIMIT: usize = 1000;

/// The resolved read plan for one collection.
#[derive(Clone)]
pub struct SchemaMapping {
    pub kind: SchemaKind,
    /// Fields to request from the store.
    pub output_fields: Vec<String>,
    pub content_limit: usize,
    extract: Extractor,
}

impl std::fmt::Debug for SchemaMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaMapping")
            .field("kind", &self.kind)
            .field("output_fields", &self.output_fields)
            .field("content_limit", &self.content_limit)
            .finish()
    }
}

impl SchemaMapping {
    pub fn has_field(&self, name: &str) -> bool {
        self.output_fields.iter().any(|f| f == name)
    }

    /// Build a [`Document`] from a raw entity.
    pub fn normalize(
        &self,
        collection: &str,
        fields: &FieldMap,
        score: f64,
        match_type: MatchType,
    ) -> Document {
        let mut doc = Document::new(collection, score, match_type);
        (self.extract)(&mut doc, fields, self);
        doc
    }
}

/// Pick the read plan for a collection from its declared fields.
///
/// Vector fields are never requested as output.
pub fn resolve(schema: &[FieldDescriptor]) -> SchemaMapping {
    let available: BTreeSet<&str> = schema
        .iter()
        .filter(|f| !f.is_vector())
        .map(|f| f.name.as_str())
        .collect();

    if let Some(rule) = RULES.iter().find(|r| r.matches(&available)) {
        return SchemaMapping {
            kind: rule.kind,
            output_fields: rule
                .output_fields
                .iter()
                .filter(|f| available.contains(*f))
                .map(|f| f.to_string())
                .collect(),
            content_limit: rule.content_limit,
            extract: rule.extract,
        };
    }

    let mut output_fields: Vec<String> = GENERIC_FIELD_PRIORITY
        .iter()
        .filter(|f| available.contains(*f))
        .map(|f| f.to_string())
        .collect();

    if output_fields.is_empty() {
        if let Some(field) = schema.iter().find(|f| !f.is_primary && !f.is_vector()) {
            output_fields.push(field.name.clone());
        }
    }

    SchemaMapping {
        kind: SchemaKind::Generic,
        output_fields,
        content_limit: GENERIC_CONTENT_LIMIT,
        extract: extract_generic,
    }
}

/// Field value as display text. Missing and null become `""`.
pub fn field_text(fields: &FieldMap, key: &str) -> String {
    match fields.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Truncate to at most `limit` characters on a char boundary.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn carry(doc: &mut Document, fields: &FieldMap, keys: &[&str]) {
    for key in keys {
        if let Some(v) = fields.get(*key) {
            if !v.is_null() {
                doc.extra.insert(key.to_string(), v.clone());
            }
        }
    }
}

fn extract_rag_document(doc: &mut Document, fields: &FieldMap, m: &SchemaMapping) {
    doc.title = field_text(fields, "title");
    doc.content = truncate_chars(&field_text(fields, "content"), m.content_limit);
    doc.source_id = field_text(fields, "source_id");
    doc.source_type = field_text(fields, "source_type");
    doc.url = non_empty(field_text(fields, "url"));
    carry(doc, fields, &["metadata"]);
}

fn extract_code(doc: &mut Document, fields: &FieldMap, m: &SchemaMapping) {
    let language = non_empty(field_text(fields, "language")).unwrap_or_else(|| "code".into());
    doc.title = field_text(fields, "file_path");
    doc.content = truncate_chars(&field_text(fields, "content"), m.content_limit);
    doc.source_type = format!("{} file", language);
    doc.source_id = field_text(fields, "file_name");
    doc.url = non_empty(field_text(fields, "github_url"));
    carry(doc, fields, &["file_path", "functions", "classes"]);
}

fn extract_action_log(doc: &mut Document, fields: &FieldMap, m: &SchemaMapping) {
    let summary = non_empty(field_text(fields, "result_summary"))
        .unwrap_or_else(|| field_text(fields, "error_message"));
    doc.title = format!(
        "{} - {}",
        field_text(fields, "action_type"),
        field_text(fields, "endpoint")
    );
    doc.content = truncate_chars(&summary, m.content_limit);
    doc.source_type = "action_log".into();
    doc.source_id = field_text(fields, "action_type");
    carry(doc, fields, &["parameters"]);
}

fn extract_persona(doc: &mut Document, fields: &FieldMap, m: &SchemaMapping) {
    doc.title = format!(
        "{} (@{})",
        field_text(fields, "display_name"),
        field_text(fields, "username")
    );
    doc.content = truncate_chars(&field_text(fields, "persona_description"), m.content_limit);
    doc.source_type = "developer_persona".into();
    doc.source_id = field_text(fields, "username");
    carry(doc, fields, &["role"]);
}

fn extract_audit(doc: &mut Document, fields: &FieldMap, m: &SchemaMapping) {
    let files = non_empty(field_text(fields, "files_analyzed")).unwrap_or_else(|| "0".into());
    doc.title = format!("Audit: {}", field_text(fields, "repo_name"));
    doc.content = truncate_chars(
        &format!(
            "Files analyzed: {}, Status: {}",
            files,
            field_text(fields, "status")
        ),
        m.content_limit,
    );
    doc.source_type = "audit_log".into();
    doc.source_id = field_text(fields, "repo_name");
}

fn extract_generic(doc: &mut Document, fields: &FieldMap, m: &SchemaMapping) {
    doc.title = m
        .output_fields
        .first()
        .map(|f| field_text(fields, f))
        .unwrap_or_default();
    doc.content = truncate_chars(&Value::Object(fields.clone()).to_string(), m.content_limit);
    doc.source_type = doc.collection.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<FieldDescriptor> {
        let mut schema = vec![FieldDescriptor::primary("id")];
        schema.extend(names.iter().map(|n| FieldDescriptor::text(*n)));
        schema.push(FieldDescriptor::vector("embedding", 384));
        schema
    }

    fn entity(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_rag_document_rule() {
        let m = resolve(&fields(&[
            "source_type",
            "source_id",
            "title",
            "content",
            "metadata",
            "url",
        ]));
        assert_eq!(m.kind, SchemaKind::RagDocument);
        assert_eq!(
            m.output_fields,
            vec!["source_type", "source_id", "title", "content", "metadata", "url"]
        );

        let doc = m.normalize(
            "jira_tickets",
            &entity(&[
                ("source_type", json!("jira")),
                ("source_id", json!("PROJ-1")),
                ("title", json!("Broken login")),
                ("content", json!("Users cannot log in")),
                ("url", json!("")),
            ]),
            0.5,
            MatchType::Semantic,
        );
        assert_eq!(doc.collection, "jira_tickets");
        assert_eq!(doc.source_id, "PROJ-1");
        assert_eq!(doc.source_type, "jira");
        assert_eq!(doc.url, None);
        assert_eq!(doc.score, 0.5);
    }

    #[test]
    fn test_source_type_wins_over_code_signature() {
        let m = resolve(&fields(&["source_type", "file_path", "content"]));
        assert_eq!(m.kind, SchemaKind::RagDocument);
    }

    #[test]
    fn test_code_rule_truncates_and_carries_extras() {
        let m = resolve(&fields(&[
            "file_path",
            "file_name",
            "language",
            "content",
            "functions",
            "classes",
            "github_url",
        ]));
        assert_eq!(m.kind, SchemaKind::Code);
        assert!(!m.has_field("repo_name"));

        let long = "x".repeat(5000);
        let doc = m.normalize(
            "codebase_analysis",
            &entity(&[
                ("file_path", json!("src/app.py")),
                ("file_name", json!("app.py")),
                ("language", json!("python")),
                ("content", json!(long)),
                ("functions", json!("main, run")),
                ("github_url", json!("https://example.com/app.py")),
            ]),
            0.7,
            MatchType::Semantic,
        );
        assert_eq!(doc.title, "src/app.py");
        assert_eq!(doc.source_type, "python file");
        assert_eq!(doc.source_id, "app.py");
        assert_eq!(doc.content.chars().count(), 1000);
        assert_eq!(doc.extra["functions"], "main, run");
        assert!(doc.extra.get("classes").is_none());
        assert_eq!(doc.url.as_deref(), Some("https://example.com/app.py"));
    }

    #[test]
    fn test_action_log_rule_falls_back_to_error_message() {
        let m = resolve(&fields(&[
            "action_type",
            "endpoint",
            "result_summary",
            "error_message",
        ]));
        assert_eq!(m.kind, SchemaKind::ActionLog);
        let doc = m.normalize(
            "action_logs",
            &entity(&[
                ("action_type", json!("fetch_jira")),
                ("endpoint", json!("/fetch-jira")),
                ("result_summary", json!("")),
                ("error_message", json!("timeout")),
            ]),
            0.4,
            MatchType::Semantic,
        );
        assert_eq!(doc.title, "fetch_jira - /fetch-jira");
        assert_eq!(doc.content, "timeout");
        assert_eq!(doc.source_type, "action_log");
    }

    #[test]
    fn test_persona_and_audit_rules() {
        let m = resolve(&fields(&["username", "display_name", "persona_description"]));
        assert_eq!(m.kind, SchemaKind::Persona);
        let doc = m.normalize(
            "github_personas",
            &entity(&[
                ("username", json!("octo")),
                ("display_name", json!("Octo Cat")),
                ("persona_description", json!("Reviews carefully")),
            ]),
            0.3,
            MatchType::Semantic,
        );
        assert_eq!(doc.title, "Octo Cat (@octo)");
        assert_eq!(doc.source_type, "developer_persona");

        let m = resolve(&fields(&["repo_name", "total_files_found", "files_analyzed", "status"]));
        assert_eq!(m.kind, SchemaKind::Audit);
        let doc = m.normalize(
            "codebase_audit",
            &entity(&[
                ("repo_name", json!("api")),
                ("files_analyzed", json!(42)),
                ("status", json!("completed")),
            ]),
            0.3,
            MatchType::Semantic,
        );
        assert_eq!(doc.title, "Audit: api");
        assert_eq!(doc.content, "Files analyzed: 42, Status: completed");
    }

    #[test]
    fn test_generic_fallback_uses_priority_list() {
        let m = resolve(&fields(&["repo_name", "title", "notes"]));
        assert_eq!(m.kind, SchemaKind::Generic);
        assert_eq!(m.output_fields, vec!["title", "repo_name"]);

        let doc = m.normalize(
            "misc",
            &entity(&[("title", json!("hello")), ("repo_name", json!("r"))]),
            0.2,
            MatchType::Semantic,
        );
        assert_eq!(doc.title, "hello");
        assert_eq!(doc.source_type, "misc");
        assert!(doc.content.contains("\"repo_name\":\"r\""));
    }

    #[test]
    fn test_generic_last_resort_skips_primary_key() {
        let m = resolve(&fields(&["blob", "other"]));
        assert_eq!(m.kind, SchemaKind::Generic);
        assert_eq!(m.output_fields, vec!["blob"]);
    }

    #[test]
    fn test_unmatched_schema_never_panics() {
        let m = resolve(&[FieldDescriptor::primary("id")]);
        assert!(m.output_fields.is_empty());
        let doc = m.normalize("bare", &FieldMap::new(), 0.1, MatchType::Semantic);
        assert_eq!(doc.title, "");
        assert_eq!(doc.collection, "bare");

        let m = resolve(&[]);
        assert_eq!(m.kind, SchemaKind::Generic);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }
}
