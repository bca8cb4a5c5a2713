//! Rule-based root-cause analysis
//!
//! Looks for the first audit error and the first fetched record that
//! carries a drifted spelling of an expected field.

use super::report::{DiagnosisMethod, Evidence, ProposedFix, Report, HEURISTIC_CONFIDENCE};
use remedy_adapter::Record;
use remedy_trace::{Event, EventKind};
use serde_json::Value;

/// A field found under an unexpected name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    /// Name present in the record
    pub observed: String,
    /// Name the consumer expects
    pub expected: String,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Find a key that is a case/separator variant of an absent expected field
#[must_use]
pub fn detect_drift(record: &Record, expected: &[String]) -> Option<Drift> {
    expected
        .iter()
        .filter(|field| !record.contains_key(field.as_str()))
        .find_map(|field| {
            let wanted = normalize(field);
            record
                .keys()
                .find(|key| !expected.contains(key) && normalize(key) == wanted)
                .map(|key| Drift {
                    observed: key.clone(),
                    expected: field.clone(),
                })
        })
}

/// Produce a heuristic report from an ordered trace
#[must_use]
pub fn analyze(events: &[Event], failure_text: &str, expected: &[String]) -> Report {
    let mut symptoms = Vec::new();
    let mut evidence = Vec::new();

    let first_error = events.iter().find_map(|e| match &e.kind {
        EventKind::Error { message, .. } => Some((e.idx, message.as_str())),
        _ => None,
    });
    if let Some((idx, message)) = first_error {
        symptoms.push(message.to_string());
        evidence.push(Evidence::new(format!("error_{idx}"), format!("Error: {message}")));
    }

    let mut primary_cause = None;
    let mut drift = None;
    'scan: for event in events {
        let EventKind::Tool {
            output: Value::Array(items),
            ..
        } = &event.kind
        else {
            continue;
        };
        for record in items.iter().filter_map(Value::as_object) {
            if let Some(found) = detect_drift(record, expected) {
                let step_id = format!("tool_{}", event.idx);
                symptoms.push(format!(
                    "schema drift detected: '{}' instead of '{}'",
                    found.observed, found.expected
                ));
                evidence.push(Evidence::new(
                    step_id.clone(),
                    format!(
                        "Record has '{}' field: {}",
                        found.observed,
                        Value::Object(record.clone())
                    ),
                ));
                primary_cause = Some(step_id);
                drift = Some(found);
                break 'scan;
            }
        }
    }

    if primary_cause.is_none() {
        primary_cause = events.iter().find_map(|e| match &e.kind {
            EventKind::Step { step_id, .. } => Some(step_id.clone()),
            _ => None,
        });
    }

    let failure = if failure_text.is_empty() {
        first_error.map_or("the run failed", |(_, m)| m)
    } else {
        failure_text
    };
    let error_message = first_error.map_or("no error event was recorded", |(_, m)| m);

    let (why_chain, proposed_fix) = match &drift {
        Some(Drift { observed, expected }) => (
            vec![
                format!("Why did the run fail? {failure}."),
                format!("Why did the Auditor stage fail? Evaluating a record raised: {error_message}."),
                format!("Why was '{expected}' missing? Fetched records carried '{observed}' instead."),
                format!(
                    "Why did fetched records carry '{observed}'? The upstream source renamed the field at {}.",
                    primary_cause.as_deref().unwrap_or("retrieval")
                ),
                format!(
                    "Root cause: the upstream data contract changed and nothing maps '{observed}' back to '{expected}' before audit."
                ),
            ],
            ProposedFix {
                tool_schema_patch: format!(
                    "Add schema adapter: rename '{observed}' to '{expected}' in fetch_log_events output"
                ),
                test_case: format!("Assert every record has '{expected}' before it reaches the Auditor"),
            },
        ),
        None => (
            vec![
                format!("Why did the run fail? {failure}."),
                format!("Why did the Auditor stage fail? {error_message}."),
                "Why was the record rejected? It did not match the schema the evaluator expects.".to_string(),
                "Why did the schema differ? No renamed variant of an expected field was found in fetched records.".to_string(),
                "Root cause: undetermined by trace inspection; the record schema needs manual review.".to_string(),
            ],
            ProposedFix {
                tool_schema_patch: "Validate record schema in the Retriever stage before audit".to_string(),
                test_case: "Assert fetched records satisfy the evaluator schema".to_string(),
            },
        ),
    };

    Report {
        primary_cause_step_id: primary_cause,
        symptoms,
        evidence,
        why_chain,
        confidence: HEURISTIC_CONFIDENCE,
        proposed_fix,
        method: DiagnosisMethod::Heuristic,
        cached_from: None,
        cached_adapter: None,
        run_id: None,
        analysis_time_s: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remediation::report::WHY_CHAIN_LEN;
    use remedy_trace::RunId;
    use serde_json::json;

    fn expected() -> Vec<String> {
        vec!["Level".to_string()]
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn event(idx: u64, kind: EventKind) -> Event {
        Event {
            ts: 0.0,
            run_id: RunId::from("run_h"),
            idx,
            kind,
        }
    }

    fn flaky_trace() -> Vec<Event> {
        vec![
            event(
                0,
                EventKind::Step {
                    agent: "Intake".into(),
                    step_id: "step-intake".into(),
                    input: json!("flaky"),
                    output: json!({"status": "ready"}),
                    latency_ms: 0,
                },
            ),
            event(
                1,
                EventKind::Tool {
                    tool: "fetch_log_events".into(),
                    args: json!([true]),
                    output: json!([{"LineId": 1, "level": "INFO"}]),
                    latency_ms: 1,
                },
            ),
            event(
                2,
                EventKind::Error {
                    message: "missing field 'Level'".into(),
                    context: json!({"agent": "Auditor", "event_id": 1}),
                },
            ),
        ]
    }

    #[test]
    fn drift_detection() {
        let drift = detect_drift(&record(json!({"level": "INFO"})), &expected()).unwrap();
        assert_eq!(drift.observed, "level");
        assert_eq!(drift.expected, "Level");

        assert!(detect_drift(&record(json!({"Level": "INFO", "level": "x"})), &expected()).is_none());
        assert!(detect_drift(&record(json!({"severity": "INFO"})), &expected()).is_none());
        assert!(detect_drift(&record(json!({"LEVEL": "INFO"})), &expected()).is_some());
    }

    #[test]
    fn flaky_trace_points_at_fetch_tool() {
        let report = analyze(&flaky_trace(), "Schema mismatch in Auditor agent", &expected());

        assert_eq!(report.primary_cause_step_id.as_deref(), Some("tool_1"));
        assert_eq!(report.method, DiagnosisMethod::Heuristic);
        assert_eq!(report.confidence, HEURISTIC_CONFIDENCE);
        assert_eq!(report.why_chain.len(), WHY_CHAIN_LEN);
        assert_eq!(report.symptoms[0], "missing field 'Level'");
        assert_eq!(report.symptoms[1], "schema drift detected: 'level' instead of 'Level'");
        assert_eq!(report.evidence[0], Evidence::new("error_2", "Error: missing field 'Level'"));
        assert_eq!(report.evidence[1].step_id, "tool_1");
        assert!(report
            .proposed_fix
            .tool_schema_patch
            .contains("rename 'level' to 'Level'"));
    }

    #[test]
    fn falls_back_to_first_step() {
        let trace: Vec<Event> = flaky_trace()
            .into_iter()
            .filter(|e| e.type_name() != "tool")
            .collect();
        let report = analyze(&trace, "", &expected());
        assert_eq!(report.primary_cause_step_id.as_deref(), Some("step-intake"));
        assert_eq!(report.why_chain.len(), WHY_CHAIN_LEN);
        assert_eq!(report.symptoms, vec!["missing field 'Level'".to_string()]);
    }

    #[test]
    fn empty_trace_has_no_cause() {
        let report = analyze(&[], "", &expected());
        assert_eq!(report.primary_cause_step_id, None);
        assert!(report.symptoms.is_empty());
        assert!(report.validate().is_ok());
    }
}
