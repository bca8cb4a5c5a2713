//! Canary validation
//!
//! Replays recent records through the audit path with the current adapter
//! mapping applied and measures error rate and p95 latency. Each canary
//! call writes only to its own scratch run.

use crate::config::Thresholds;
use crate::error::Result;
use remedy_pipeline::telemetry::names;
use remedy_pipeline::{IngestionSource, PipelineExecutor, RunMode};
use remedy_trace::{elapsed_ms, MetricKey, RunId, RunStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Measured outcome of a canary replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryResult {
    pub total: usize,
    pub errors: usize,
    pub error_rate: f64,
    pub latency_p95_ms: f64,
    pub passed: bool,
    pub reason: String,
    /// Scratch run the replay was traced under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_run_id: Option<RunId>,
    #[serde(default)]
    pub duration_s: f64,
}

impl CanaryResult {
    /// Result for an empty sample
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total: 0,
            errors: 0,
            error_rate: 0.0,
            latency_p95_ms: 0.0,
            passed: false,
            reason: "No events to test".to_string(),
            scratch_run_id: None,
            duration_s: 0.0,
        }
    }

    /// Result from raw counts and per-record latencies
    ///
    /// `passed` requires both metrics within `thresholds`; when both are
    /// violated the error-rate message is reported.
    #[must_use]
    pub fn from_samples(errors: usize, latencies_ms: &[f64], thresholds: &Thresholds) -> Self {
        let total = latencies_ms.len();
        if total == 0 {
            return Self::empty();
        }
        let error_rate = errors as f64 / total as f64;
        let latency_p95_ms = p95(latencies_ms);

        let passed =
            error_rate <= thresholds.max_error_rate && latency_p95_ms <= thresholds.max_p95_latency_ms;
        let reason = if error_rate > thresholds.max_error_rate {
            format!(
                "Error rate {:.2}% exceeds threshold {:.2}%",
                error_rate * 100.0,
                thresholds.max_error_rate * 100.0
            )
        } else if latency_p95_ms > thresholds.max_p95_latency_ms {
            format!(
                "P95 latency {latency_p95_ms:.0}ms exceeds threshold {:.0}ms",
                thresholds.max_p95_latency_ms
            )
        } else {
            "All checks passed".to_string()
        };

        Self {
            total,
            errors,
            error_rate,
            latency_p95_ms,
            passed,
            reason,
            scratch_run_id: None,
            duration_s: 0.0,
        }
    }
}

/// Nearest-rank p95: sorted ascending, index `floor(0.95 * n)`
#[must_use]
pub fn p95(latencies_ms: &[f64]) -> f64 {
    if latencies_ms.is_empty() {
        return 0.0;
    }
    let mut sorted = latencies_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = ((0.95 * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Replays recent records against the live adapter mapping
pub struct CanaryRunner {
    executor: Arc<PipelineExecutor>,
    source: Arc<dyn IngestionSource>,
    thresholds: Thresholds,
}

impl CanaryRunner {
    #[must_use]
    pub fn new(executor: Arc<PipelineExecutor>, source: Arc<dyn IngestionSource>, thresholds: Thresholds) -> Self {
        Self {
            executor,
            source,
            thresholds,
        }
    }

    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Replay up to `n` recent records for the incident `run_id`
    ///
    /// Never touches the adapter registry or the incident run. With no
    /// records available the result is a failed canary, not an error.
    ///
    /// # Errors
    /// Trace store failures on the scratch run.
    pub fn run(&self, run_id: &RunId, n: usize) -> Result<CanaryResult> {
        let started = Instant::now();
        let records = self.source.get_recent(n);
        if records.is_empty() {
            tracing::warn!(%run_id, "canary has no records to replay");
            return Ok(CanaryResult::empty());
        }

        let scratch = self.executor.start_run(&RunMode::Canary)?;
        let mut errors = 0;
        let mut latencies = Vec::with_capacity(records.len());
        for record in records {
            let replay_started = Instant::now();
            let output = self.executor.replay(&scratch, record)?;
            latencies.push(elapsed_ms(replay_started) as f64);
            if output.error_occurred {
                errors += 1;
            }
        }

        let mut result = CanaryResult::from_samples(errors, &latencies, &self.thresholds);
        let store = self.executor.store();
        if result.errors > 0 {
            store.set_status(&scratch, RunStatus::Failed)?;
            store.save_metric(&scratch, MetricKey::FailReason.as_str(), result.reason.as_str())?;
        } else {
            store.set_status(&scratch, RunStatus::Ok)?;
        }

        let telemetry = self.executor.telemetry();
        let tags = [("incident", run_id.to_string())];
        telemetry.gauge(names::CANARY_ERROR_RATE, result.error_rate, &tags);
        telemetry.gauge(names::CANARY_P95_MS, result.latency_p95_ms, &tags);

        result.scratch_run_id = Some(scratch);
        result.duration_s = started.elapsed().as_secs_f64();
        tracing::info!(
            %run_id,
            total = result.total,
            errors = result.errors,
            p95_ms = result.latency_p95_ms,
            passed = result.passed,
            "canary finished"
        );
        Ok(result)
    }
}

impl fmt::Debug for CanaryRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanaryRunner")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_of_twenty_takes_the_last() {
        let latencies: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(p95(&latencies), 20.0);
    }

    #[test]
    fn p95_sorts_first() {
        assert_eq!(p95(&[5.0, 1.0, 3.0]), 5.0);
        assert_eq!(p95(&[7.0]), 7.0);
        assert_eq!(p95(&[]), 0.0);
        let hundred: Vec<f64> = (0..100).rev().map(f64::from).collect();
        assert_eq!(p95(&hundred), 95.0);
    }

    #[test]
    fn empty_sample_fails() {
        let result = CanaryResult::from_samples(0, &[], &Thresholds::default());
        assert_eq!(result, CanaryResult::empty());
        assert!(!result.passed);
        assert_eq!(result.reason, "No events to test");
    }

    #[test]
    fn error_rate_message_takes_precedence() {
        let result = CanaryResult::from_samples(1, &[600.0, 600.0, 600.0, 600.0], &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.error_rate, 0.25);
        assert_eq!(result.reason, "Error rate 25.00% exceeds threshold 1.00%");
    }

    #[test]
    fn latency_violation() {
        let result = CanaryResult::from_samples(0, &[100.0, 700.0], &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.reason, "P95 latency 700ms exceeds threshold 500ms");
    }

    #[test]
    fn thresholds_are_inclusive() {
        let thresholds = Thresholds {
            max_error_rate: 0.5,
            max_p95_latency_ms: 500.0,
        };
        let result = CanaryResult::from_samples(1, &[500.0, 1.0], &thresholds);
        assert!(result.passed);
        assert_eq!(result.reason, "All checks passed");
    }
}
