//! Trace shape fingerprints
//!
//! The fingerprint depends only on which field names appear and on the
//! sequence of the first event types, never on field values. The canonical
//! shape string is hashed with SHA-256 and each of the first 32 digest bytes
//! becomes one component in `[0, 1]`.

use remedy_trace::{Event, EventKind};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Components per embedding
pub const EMBEDDING_DIM: usize = 32;

/// Leading events whose types enter the shape
pub const SHAPE_PREFIX: usize = 10;

/// Fixed-length shape vector
pub type Embedding = Vec<f64>;

/// Canonical `fields|types` string for a trace
///
/// Field names come from object records in array-valued tool outputs and
/// from the `record` object of error contexts.
#[must_use]
pub fn shape_key(events: &[Event]) -> String {
    let mut fields = BTreeSet::new();
    for event in events {
        match &event.kind {
            EventKind::Tool {
                output: Value::Array(items),
                ..
            } => {
                for item in items {
                    if let Value::Object(record) = item {
                        fields.extend(record.keys().map(String::as_str));
                    }
                }
            }
            EventKind::Error { context, .. } => {
                if let Some(Value::Object(record)) = context.get("record") {
                    fields.extend(record.keys().map(String::as_str));
                }
            }
            _ => {}
        }
    }

    let types: Vec<&str> = events
        .iter()
        .take(SHAPE_PREFIX)
        .map(Event::type_name)
        .collect();

    format!(
        "{}|{}",
        fields.into_iter().collect::<Vec<_>>().join(","),
        types.join(",")
    )
}

/// Hex SHA-256 of the shape string, handy for logs
#[must_use]
pub fn shape_digest(events: &[Event]) -> String {
    hex::encode(Sha256::digest(shape_key(events).as_bytes()))
}

/// Shape embedding of a trace
#[must_use]
pub fn fingerprint(events: &[Event]) -> Embedding {
    let digest = Sha256::digest(shape_key(events).as_bytes());
    digest
        .iter()
        .cycle()
        .take(EMBEDDING_DIM)
        .map(|b| f64::from(*b) / 255.0)
        .collect()
}

/// Cosine similarity; zero for mismatched lengths or zero vectors
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_trace::RunId;
    use serde_json::json;

    fn event(idx: u64, kind: EventKind) -> Event {
        Event {
            ts: idx as f64,
            run_id: RunId::from("run_test"),
            idx,
            kind,
        }
    }

    fn fetch(idx: u64, output: Value) -> Event {
        event(
            idx,
            EventKind::Tool {
                tool: "fetch_log_events".into(),
                args: json!([true]),
                output,
                latency_ms: 1,
            },
        )
    }

    fn error(idx: u64, record: Value) -> Event {
        event(
            idx,
            EventKind::Error {
                message: "missing field 'Level'".into(),
                context: json!({"agent": "Auditor", "record": record}),
            },
        )
    }

    #[test]
    fn shape_key_is_sorted_and_deduplicated() {
        let events = vec![
            fetch(0, json!([{"b": 1, "a": 2}, {"a": 3, "c": 4}])),
            error(1, json!({"z": 1, "a": 0})),
        ];
        assert_eq!(shape_key(&events), "a,b,c,z|tool,error");
    }

    #[test]
    fn values_do_not_matter() {
        let a = vec![fetch(0, json!([{"level": "INFO", "LineId": 1}]))];
        let b = vec![fetch(0, json!([{"level": "ERROR", "LineId": 9999}]))];
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(shape_digest(&a), shape_digest(&b));
    }

    #[test]
    fn only_first_ten_types_count() {
        let base: Vec<Event> = (0..10).map(|i| fetch(i, json!([]))).collect();
        let mut longer = base.clone();
        longer.push(error(10, json!({})));
        assert_eq!(shape_key(&base), shape_key(&longer));
    }

    #[test]
    fn embedding_components_in_unit_range() {
        let embedding = fingerprint(&[fetch(0, json!([{"Level": "INFO"}]))]);
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        assert!(embedding.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn cosine_edge_cases() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
