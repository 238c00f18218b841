//! Diversity interleaving of fan-out results.
//!
//! Exact matches always lead, best first. Semantic documents are grouped by
//! collection and merged round-robin so that every collection is
//! represented before any one of them contributes a second document.
//! Collections take turns in lexicographic name order.

use std::collections::{BTreeMap, VecDeque};

use crate::models::Document;

fn by_score_desc(docs: &mut [Document]) {
    docs.sort_by(|a, b| b.score.total_cmp(&a.score));
}

pub fn interleave(documents: Vec<Document>) -> Vec<Document> {
    let total = documents.len();
    let (mut exact, semantic): (Vec<Document>, Vec<Document>) =
        documents.into_iter().partition(|d| d.is_exact());
    by_score_desc(&mut exact);

    let mut groups: BTreeMap<String, Vec<Document>> = BTreeMap::new();
    for doc in semantic {
        groups.entry(doc.collection.clone()).or_default().push(doc);
    }
    let mut queues: Vec<VecDeque<Document>> = groups
        .into_values()
        .map(|mut group| {
            by_score_desc(&mut group);
            VecDeque::from(group)
        })
        .collect();

    let mut out = Vec::with_capacity(total);
    out.append(&mut exact);
    while queues.iter().any(|q| !q.is_empty()) {
        for queue in queues.iter_mut() {
            if let Some(doc) = queue.pop_front() {
                out.push(doc);
            }
        }
    }
    out
}
