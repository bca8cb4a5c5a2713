//! The three pipeline stages
//!
//! Each implements [`Stage`] and is wrapped in [`remedy_trace::Instrumented`]
//! by the executor. Per-record evaluation failures are values in
//! [`AuditOutput`], never stage errors.

use crate::error::PipelineError;
use crate::ingest::IngestionSource;
use crate::record::{apply_drift, evaluate_record, record_id};
use remedy_adapter::{AdapterRegistry, Record};
use remedy_trace::{elapsed_ms, Stage, Tracer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Agent name of the audit stage, also used in error context
pub const AUDITOR: &str = "Auditor";

/// Pipeline execution mode
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunMode {
    Normal,
    /// Upstream emits drifted records
    Flaky,
    /// Validation replay
    Canary,
    Other(String),
}

impl RunMode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Normal => "normal",
            Self::Flaky => "flaky",
            Self::Canary => "canary",
            Self::Other(s) => s,
        }
    }

    /// Records fetched per run
    #[must_use]
    pub fn batch_size(&self) -> usize {
        match self {
            Self::Normal | Self::Flaky => 5,
            Self::Canary | Self::Other(_) => 3,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_flaky(&self) -> bool {
        matches!(self, Self::Flaky)
    }
}

impl From<&str> for RunMode {
    fn from(value: &str) -> Self {
        match value {
            "normal" => Self::Normal,
            "flaky" => Self::Flaky,
            "canary" => Self::Canary,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for RunMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<RunMode> for String {
    fn from(mode: RunMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness check
#[derive(Debug, Clone, Copy, Default)]
pub struct IntakeStage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeOutput {
    pub status: &'static str,
    pub mode: RunMode,
}

impl Stage for IntakeStage {
    type Input = RunMode;
    type Output = IntakeOutput;
    type Error = PipelineError;

    fn agent(&self) -> &'static str {
        "Intake"
    }

    fn run(&self, _tracer: &Tracer, mode: RunMode) -> Result<IntakeOutput, PipelineError> {
        Ok(IntakeOutput {
            status: "ready",
            mode,
        })
    }
}

/// Fetches a batch from the ingestion source
pub struct RetrieveStage {
    source: Arc<dyn IngestionSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrieveOutput {
    pub records: Vec<Record>,
    pub count: usize,
}

impl RetrieveStage {
    #[must_use]
    pub fn new(source: Arc<dyn IngestionSource>) -> Self {
        Self { source }
    }
}

impl fmt::Debug for RetrieveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrieveStage").finish_non_exhaustive()
    }
}

impl Stage for RetrieveStage {
    type Input = RunMode;
    type Output = RetrieveOutput;
    type Error = PipelineError;

    fn agent(&self) -> &'static str {
        "Retriever"
    }

    fn run(&self, tracer: &Tracer, mode: RunMode) -> Result<RetrieveOutput, PipelineError> {
        let flaky = mode.is_flaky();
        let records = tracer.tool("fetch_log_events", json!([flaky]), || {
            let mut batch = self.source.get_recent(mode.batch_size());
            if flaky {
                batch.iter_mut().for_each(apply_drift);
            }
            batch
        })?;
        let count = records.len();
        Ok(RetrieveOutput { records, count })
    }
}

/// Audit input: the batch and whether to adapt it first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditInput {
    pub records: Vec<Record>,
    pub use_adapters: bool,
}

/// Outcome for one audited record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AuditEntry {
    Evaluated {
        event_id: Value,
        flagged: bool,
        reason: String,
    },
    Failed {
        event_id: Value,
        error: String,
    },
}

impl AuditEntry {
    #[inline]
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        matches!(self, Self::Evaluated { flagged: true, .. })
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Aggregate of per-record results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditOutput {
    pub results: Vec<AuditEntry>,
    pub error_occurred: bool,
}

impl AuditOutput {
    #[must_use]
    pub fn flagged(&self) -> usize {
        self.results.iter().filter(|r| r.is_flagged()).count()
    }

    #[must_use]
    pub fn errored(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }
}

/// Evaluates every record, containing failures per record
#[derive(Debug)]
pub struct AuditStage {
    registry: Arc<AdapterRegistry>,
}

impl AuditStage {
    #[must_use]
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }
}

impl Stage for AuditStage {
    type Input = AuditInput;
    type Output = AuditOutput;
    type Error = PipelineError;

    fn agent(&self) -> &'static str {
        AUDITOR
    }

    fn run(&self, tracer: &Tracer, input: AuditInput) -> Result<AuditOutput, PipelineError> {
        let mut results = Vec::with_capacity(input.records.len());
        let mut error_occurred = false;

        for record in input.records {
            let record = if input.use_adapters {
                self.registry.apply(&record)
            } else {
                record
            };
            let event_id = record_id(&record);

            let started = Instant::now();
            match evaluate_record(&record) {
                Ok(evaluation) => {
                    tracer.record_tool(
                        "evaluate_event",
                        json!([record]),
                        serde_json::to_value(&evaluation).map_err(remedy_trace::TraceError::from)?,
                        elapsed_ms(started),
                    )?;
                    results.push(AuditEntry::Evaluated {
                        event_id,
                        flagged: evaluation.flagged,
                        reason: evaluation.reason,
                    });
                }
                Err(e) => {
                    error_occurred = true;
                    tracing::warn!(run_id = %tracer.run_id(), %event_id, error = %e, "record failed audit");
                    tracer.error(
                        e.to_string(),
                        json!({
                            "agent": AUDITOR,
                            "event_id": event_id,
                            "record": record,
                        }),
                    )?;
                    results.push(AuditEntry::Failed {
                        event_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(AuditOutput {
            results,
            error_occurred,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MockIngestionSource;
    use remedy_adapter::Mapping;
    use remedy_trace::{EventKind, TraceStore};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn tracer() -> Tracer {
        let store = Arc::new(TraceStore::in_memory());
        let run_id = store.start_run("normal").unwrap();
        Tracer::new(store, run_id)
    }

    #[test]
    fn run_mode_wire_names() {
        assert_eq!(RunMode::from("flaky"), RunMode::Flaky);
        assert_eq!(RunMode::from("replay"), RunMode::Other("replay".into()));
        assert_eq!(serde_json::to_value(RunMode::Canary).unwrap(), json!("canary"));
        assert_eq!(RunMode::Other("x".into()).batch_size(), 3);
    }

    #[test]
    fn retrieve_drifts_records_in_flaky_mode() {
        let mut source = MockIngestionSource::new();
        source
            .expect_get_recent()
            .withf(|n| *n == 5)
            .returning(|n| (0..n).map(|i| record(json!({"LineId": i, "Level": "INFO"}))).collect());

        let tracer = tracer();
        let out = RetrieveStage::new(Arc::new(source))
            .run(&tracer, RunMode::Flaky)
            .unwrap();

        assert_eq!(out.count, 5);
        assert!(out.records.iter().all(|r| r.contains_key("level")));

        let events = tracer.store().load_events(tracer.run_id());
        match &events[0].kind {
            EventKind::Tool { tool, args, .. } => {
                assert_eq!(tool, "fetch_log_events");
                assert_eq!(args, &json!([true]));
            }
            other => panic!("expected tool event, got {other:?}"),
        }
    }

    #[test]
    fn audit_contains_per_record_failures() {
        let tracer = tracer();
        let stage = AuditStage::new(Arc::new(AdapterRegistry::in_memory()));
        let out = stage
            .run(
                &tracer,
                AuditInput {
                    records: vec![
                        record(json!({"LineId": 1, "Level": "ERROR"})),
                        record(json!({"LineId": 2, "level": "INFO"})),
                        record(json!({"LineId": 3, "Level": "INFO", "latency_ms": 120})),
                    ],
                    use_adapters: false,
                },
            )
            .unwrap();

        assert!(out.error_occurred);
        assert_eq!(out.results.len(), 3);
        assert_eq!(out.flagged(), 1);
        assert_eq!(out.errored(), 1);

        let events = tracer.store().load_events(tracer.run_id());
        let types: Vec<_> = events.iter().map(|e| e.type_name()).collect();
        assert_eq!(types, vec!["tool", "error", "tool"]);
        match &events[1].kind {
            EventKind::Error { message, context } => {
                assert_eq!(message, "missing field 'Level'");
                assert_eq!(context["agent"], AUDITOR);
                assert_eq!(context["event_id"], 2);
                assert_eq!(context["record"]["level"], "INFO");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn audit_applies_adapters_when_asked() {
        let registry = Arc::new(AdapterRegistry::in_memory());
        registry
            .set(&Mapping::from([("level".to_string(), "Level".to_string())]))
            .unwrap();
        let stage = AuditStage::new(registry);
        let drifted = vec![record(json!({"LineId": 9, "level": "WARNING"}))];

        let adapted = stage
            .run(
                &tracer(),
                AuditInput {
                    records: drifted.clone(),
                    use_adapters: true,
                },
            )
            .unwrap();
        assert!(!adapted.error_occurred);

        let raw = stage
            .run(
                &tracer(),
                AuditInput {
                    records: drifted,
                    use_adapters: false,
                },
            )
            .unwrap();
        assert!(raw.error_occurred);
    }
}
