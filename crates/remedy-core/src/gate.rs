//! Promote/rollback decision gate
//!
//! [`evaluate`] is the pure thresholding function. [`DecisionGate::decide`]
//! applies its side effect: a rollback clears the whole adapter registry.

use crate::canary::CanaryResult;
use crate::config::Thresholds;
use crate::error::Result;
use remedy_adapter::AdapterRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Outcome of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Promote,
    Rollback,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Promote => "promote",
            Self::Rollback => "rollback",
        })
    }
}

/// Canary metrics echoed on every decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub error_rate: f64,
    pub latency_p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    pub metrics: DecisionMetrics,
}

impl Decision {
    #[inline]
    #[must_use]
    pub fn is_promote(&self) -> bool {
        self.action == Action::Promote
    }
}

/// Threshold a canary result on error rate and p95 latency only
#[must_use]
pub fn evaluate(canary: &CanaryResult, thresholds: &Thresholds) -> Decision {
    let metrics = DecisionMetrics {
        error_rate: canary.error_rate,
        latency_p95_ms: canary.latency_p95_ms,
    };

    let mut violations = Vec::new();
    if canary.error_rate > thresholds.max_error_rate {
        violations.push(format!(
            "Error rate {:.2}% exceeds {:.2}%",
            canary.error_rate * 100.0,
            thresholds.max_error_rate * 100.0
        ));
    }
    if canary.latency_p95_ms > thresholds.max_p95_latency_ms {
        violations.push(format!(
            "P95 latency {:.0}ms exceeds {:.0}ms",
            canary.latency_p95_ms, thresholds.max_p95_latency_ms
        ));
    }

    if violations.is_empty() {
        Decision {
            action: Action::Promote,
            reason: canary.reason.clone(),
            metrics,
        }
    } else {
        Decision {
            action: Action::Rollback,
            reason: violations.join("; "),
            metrics,
        }
    }
}

/// Gate bound to the live adapter registry
#[derive(Debug)]
pub struct DecisionGate {
    registry: Arc<AdapterRegistry>,
    thresholds: Thresholds,
}

impl DecisionGate {
    #[must_use]
    pub fn new(registry: Arc<AdapterRegistry>, thresholds: Thresholds) -> Self {
        Self {
            registry,
            thresholds,
        }
    }

    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Decide with the gate's own thresholds
    ///
    /// # Errors
    /// Adapter persistence failures while clearing on rollback.
    pub fn decide(&self, canary: &CanaryResult) -> Result<Decision> {
        self.decide_with(canary, &self.thresholds)
    }

    /// Decide with explicit thresholds; a rollback clears every adapter
    ///
    /// # Errors
    /// Adapter persistence failures while clearing on rollback.
    pub fn decide_with(&self, canary: &CanaryResult, thresholds: &Thresholds) -> Result<Decision> {
        let decision = evaluate(canary, thresholds);
        match decision.action {
            Action::Promote => {
                tracing::info!(reason = %decision.reason, "patch promoted");
            }
            Action::Rollback => {
                self.registry.clear()?;
                tracing::warn!(reason = %decision.reason, "patch rolled back; adapters cleared");
            }
        }
        Ok(decision)
    }
}
