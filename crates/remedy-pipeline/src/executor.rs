//! Pipeline executor
//!
//! Composes the instrumented Intake → Retrieve → Audit stages over a shared
//! [`TraceStore`] and [`AdapterRegistry`], and finalizes the run's status.

use crate::error::Result;
use crate::ingest::{IngestionSink, IngestionSource};
use crate::stages::{
    AuditInput, AuditOutput, AuditStage, IntakeStage, RetrieveStage, RunMode,
};
use crate::telemetry::{names, NoopSink, TelemetrySink};
use remedy_adapter::{AdapterRegistry, Record};
use remedy_trace::{elapsed_ms, Instrumented, MetricKey, RunId, RunStatus, TraceStore, Tracer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Recorded on a run whose audit contained errors
pub const FAIL_REASON: &str = "Schema mismatch in Auditor agent";

/// Aggregate counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub records: usize,
    pub flagged: usize,
    pub errored: usize,
}

/// Result of [`PipelineExecutor::run_pipeline`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub fail_reason: Option<String>,
    pub counts: RunCounts,
}

impl PipelineOutcome {
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }
}

/// Runs the three-stage pipeline
pub struct PipelineExecutor {
    store: Arc<TraceStore>,
    intake: Instrumented<IntakeStage>,
    retrieve: Instrumented<RetrieveStage>,
    audit: Instrumented<AuditStage>,
    recorder: Option<Arc<dyn IngestionSink>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PipelineExecutor {
    /// Executor reading batches from `source`
    #[must_use]
    pub fn new(
        store: Arc<TraceStore>,
        registry: Arc<AdapterRegistry>,
        source: Arc<dyn IngestionSource>,
    ) -> Self {
        Self {
            store,
            intake: Instrumented::new(IntakeStage),
            retrieve: Instrumented::new(RetrieveStage::new(source)),
            audit: Instrumented::new(AuditStage::new(registry)),
            recorder: None,
            telemetry: Arc::new(NoopSink),
        }
    }

    /// Mirror every retrieved batch into `sink`
    #[must_use]
    pub fn with_recorder(mut self, sink: Arc<dyn IngestionSink>) -> Self {
        self.recorder = Some(sink);
        self
    }

    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<TraceStore> {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        self.audit.inner().registry()
    }

    #[inline]
    #[must_use]
    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Create a run row for `mode`
    ///
    /// # Errors
    /// Trace store persistence failures.
    pub fn start_run(&self, mode: &RunMode) -> Result<RunId> {
        Ok(self.store.start_run(mode.as_str())?)
    }

    /// Sequence Intake → Retrieve → Audit for an existing run
    ///
    /// Per-record audit failures only affect the final status. If the
    /// store itself fails mid-run the run is marked failed on a best-effort
    /// basis and the error is returned.
    ///
    /// # Errors
    /// Trace store failures.
    pub fn run_pipeline(&self, run_id: &RunId, mode: &RunMode, use_adapters: bool) -> Result<PipelineOutcome> {
        let started = Instant::now();
        tracing::info!(%run_id, %mode, use_adapters, "pipeline run started");

        match self.execute(run_id, mode, use_adapters) {
            Ok(outcome) => {
                let tags = [
                    ("mode", mode.to_string()),
                    ("status", outcome.status.to_string()),
                ];
                self.telemetry
                    .counter(names::PIPELINE_RECORDS, outcome.counts.records as u64, &tags);
                self.telemetry
                    .counter(names::PIPELINE_ERRORS, outcome.counts.errored as u64, &tags);
                self.telemetry
                    .histogram(names::PIPELINE_LATENCY_MS, elapsed_ms(started) as f64, &tags);
                tracing::info!(
                    %run_id,
                    status = %outcome.status,
                    records = outcome.counts.records,
                    errored = outcome.counts.errored,
                    "pipeline run finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(%run_id, error = %e, "pipeline run aborted");
                let _ = self.store.set_status(run_id, RunStatus::Failed);
                let _ = self
                    .store
                    .save_metric(run_id, MetricKey::FailReason.as_str(), e.to_string());
                Err(e)
            }
        }
    }

    fn execute(&self, run_id: &RunId, mode: &RunMode, use_adapters: bool) -> Result<PipelineOutcome> {
        let tracer = Tracer::new(Arc::clone(&self.store), run_id.clone());

        self.intake.run(&tracer, mode.clone())?;
        let retrieved = self.retrieve.run(&tracer, mode.clone())?;
        self.record_batch(&retrieved.records);

        let audit = self.audit.run(
            &tracer,
            AuditInput {
                records: retrieved.records,
                use_adapters,
            },
        )?;

        let counts = RunCounts {
            records: retrieved.count,
            flagged: audit.flagged(),
            errored: audit.errored(),
        };

        let (status, fail_reason) = if audit.error_occurred {
            (RunStatus::Failed, Some(FAIL_REASON.to_string()))
        } else {
            (RunStatus::Ok, None)
        };
        self.store.set_status(run_id, status)?;
        if let Some(reason) = &fail_reason {
            self.store
                .save_metric(run_id, MetricKey::FailReason.as_str(), reason.as_str())?;
        }

        Ok(PipelineOutcome {
            run_id: run_id.clone(),
            status,
            fail_reason,
            counts,
        })
    }

    /// Replay one record through Intake and Audit with adapters applied
    ///
    /// Used by validation replays; the caller owns `run_id`.
    ///
    /// # Errors
    /// Trace store failures.
    pub fn replay(&self, run_id: &RunId, record: Record) -> Result<AuditOutput> {
        let tracer = Tracer::new(Arc::clone(&self.store), run_id.clone());
        self.intake.run(&tracer, RunMode::Canary)?;
        self.audit.run(
            &tracer,
            AuditInput {
                records: vec![record],
                use_adapters: true,
            },
        )
    }

    fn record_batch(&self, records: &[Record]) {
        let Some(sink) = &self.recorder else {
            return;
        };
        for record in records {
            if let Err(e) = sink.insert(record.clone()) {
                tracing::debug!(error = %e, "failed to mirror retrieved record");
            }
        }
    }
}

impl fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("store", &self.store)
            .field("registry", self.registry())
            .field("recorder", &self.recorder.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureInjection;
    use crate::ingest::{IngestionBuffer, SyntheticSource};
    use crate::record::LogRecordGenerator;
    use remedy_adapter::Mapping;

    fn executor() -> (PipelineExecutor, Arc<IngestionBuffer>) {
        let buffer = Arc::new(IngestionBuffer::default());
        let source = SyntheticSource::new(LogRecordGenerator::default(), Arc::new(FailureInjection::new()));
        let executor = PipelineExecutor::new(
            Arc::new(TraceStore::in_memory()),
            Arc::new(AdapterRegistry::in_memory()),
            Arc::new(source),
        )
        .with_recorder(buffer.clone());
        (executor, buffer)
    }

    #[test]
    fn normal_run_is_ok() {
        let (executor, buffer) = executor();
        let run_id = executor.start_run(&RunMode::Normal).unwrap();
        let outcome = executor.run_pipeline(&run_id, &RunMode::Normal, false).unwrap();

        assert_eq!(outcome.status, RunStatus::Ok);
        assert_eq!(outcome.fail_reason, None);
        assert_eq!(outcome.counts.records, 5);
        assert_eq!(outcome.counts.errored, 0);
        assert_eq!(buffer.len(), 5);

        let run = executor.store().get_run(&run_id).unwrap();
        assert_eq!(run.status, RunStatus::Ok);
    }

    #[test]
    fn flaky_run_fails_with_fixed_reason() {
        let (executor, _) = executor();
        let run_id = executor.start_run(&RunMode::Flaky).unwrap();
        let outcome = executor.run_pipeline(&run_id, &RunMode::Flaky, false).unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.fail_reason.as_deref(), Some(FAIL_REASON));
        assert_eq!(outcome.counts.errored, 5);

        let run = executor.store().get_run(&run_id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.fail_reason.as_deref(), Some(FAIL_REASON));
    }

    #[test]
    fn adapters_repair_flaky_run() {
        let (executor, _) = executor();
        executor
            .registry()
            .set(&Mapping::from([("level".to_string(), "Level".to_string())]))
            .unwrap();
        let run_id = executor.start_run(&RunMode::Flaky).unwrap();
        let outcome = executor.run_pipeline(&run_id, &RunMode::Flaky, true).unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn event_order_is_intake_retrieve_audit() {
        let (executor, _) = executor();
        let run_id = executor.start_run(&RunMode::Flaky).unwrap();
        executor.run_pipeline(&run_id, &RunMode::Flaky, false).unwrap();

        let events = executor.store().load_events(&run_id);
        let types: Vec<_> = events.iter().map(|e| e.type_name()).collect();
        assert_eq!(
            types,
            vec!["step", "tool", "step", "error", "error", "error", "error", "error", "step"]
        );
        assert!(events.windows(2).all(|w| w[0].idx + 1 == w[1].idx));
    }

    #[test]
    fn replay_uses_current_adapters() {
        let (executor, _) = executor();
        let drifted: Record = serde_json::json!({"LineId": 1, "level": "INFO"})
            .as_object()
            .cloned()
            .unwrap();
        let run_id = executor.start_run(&RunMode::Canary).unwrap();

        assert!(executor.replay(&run_id, drifted.clone()).unwrap().error_occurred);

        executor
            .registry()
            .set(&Mapping::from([("level".to_string(), "Level".to_string())]))
            .unwrap();
        assert!(!executor.replay(&run_id, drifted).unwrap().error_occurred);
    }
}
