//! Confidence estimation.
//!
//! Source confidence scores the retrieved evidence:
//!
//! | Factor | Weight | Saturates at |
//! |--------|--------|--------------|
//! | mean relevance score | 0.4 | n/a |
//! | document count | 0.2 | 10 |
//! | distinct collections | 0.2 | 3 |
//! | documents scoring > 0.8 | 0.2 | 3 |
//!
//! When the model appends a `MARKER: <float>` line to its answer, that
//! self-assessment becomes the headline score and the source confidence is
//! attached as a nested diagnostic.

use std::collections::HashSet;

use crate::models::{
    ConfidenceFactors, ConfidenceKind, ConfidenceLevel, ConfidenceResult, Document,
};

/// Score above which a source counts as high quality.
pub const HIGH_QUALITY_THRESHOLD: f64 = 0.8;

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Retrieval-quality confidence for a fused document list.
///
/// `count` is the raw number of documents retrieved, which may differ from
/// `sources.len()` when extra context was appended.
pub fn source_confidence(sources: &[Document], count: usize) -> ConfidenceResult {
    if sources.is_empty() {
        return ConfidenceResult {
            score: 0.0,
            level: ConfidenceLevel::NoData,
            factors: Some(ConfidenceFactors::default()),
            answer_confidence: None,
            source_confidence: None,
            kind: None,
        };
    }

    let mean = sources.iter().map(|d| d.score).sum::<f64>() / sources.len() as f64;
    let distinct: HashSet<&str> = sources
        .iter()
        .map(|d| {
            if d.collection.is_empty() {
                d.source_type.as_str()
            } else {
                d.collection.as_str()
            }
        })
        .collect();
    let high_quality = sources
        .iter()
        .filter(|d| d.score > HIGH_QUALITY_THRESHOLD)
        .count();

    let raw = ConfidenceFactors {
        source_quality: mean * 0.4,
        source_quantity: (count as f64 / 10.0).min(1.0) * 0.2,
        source_diversity: (distinct.len() as f64 / 3.0).min(1.0) * 0.2,
        high_quality_sources: (high_quality as f64 / 3.0).min(1.0) * 0.2,
    };
    let total = raw.total();

    ConfidenceResult {
        score: round3(total),
        level: ConfidenceLevel::from_score(total),
        factors: Some(ConfidenceFactors {
            source_quality: round3(raw.source_quality),
            source_quantity: round3(raw.source_quantity),
            source_diversity: round3(raw.source_diversity),
            high_quality_sources: round3(raw.high_quality_sources),
        }),
        answer_confidence: None,
        source_confidence: None,
        kind: None,
    }
}

fn marker_prefix(marker: &str) -> String {
    format!("{}:", marker)
}

/// The model's self-reported confidence, if present and well formed.
///
/// Only the first line containing `MARKER:` is considered. The value must
/// parse as a finite float within `[0, 1]`.
pub fn parse_self_report(answer: &str, marker: &str) -> Option<f64> {
    let prefix = marker_prefix(marker);
    let line = answer.lines().find(|l| l.contains(&prefix))?;
    let (_, rest) = line.split_once(&prefix)?;
    let value: f64 = rest.trim().parse().ok()?;
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Remove the first marker line from the answer and trim the result.
pub fn strip_marker(answer: &str, marker: &str) -> String {
    let prefix = marker_prefix(marker);
    let mut removed = false;
    let kept: Vec<&str> = answer
        .lines()
        .filter(|l| {
            if !removed && l.contains(&prefix) {
                removed = true;
                false
            } else {
                true
            }
        })
        .collect();
    kept.join("\n").trim().to_string()
}

/// Merge source confidence with an optional self-report.
pub fn combine(source: ConfidenceResult, answer_confidence: Option<f64>) -> ConfidenceResult {
    match answer_confidence {
        Some(value) => ConfidenceResult {
            score: round3(value),
            level: ConfidenceLevel::from_score(value),
            factors: None,
            answer_confidence: Some(round3(value)),
            source_confidence: Some(Box::new(source)),
            kind: Some(ConfidenceKind::Dual),
        },
        None => ConfidenceResult {
            kind: Some(ConfidenceKind::SourceOnly),
            ..source
        },
    }
}
