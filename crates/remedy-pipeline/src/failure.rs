//! Failure-injection switches
//!
//! Owned by whoever composes the pipeline and shared by `Arc`; there is no
//! process-wide default instance.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Point-in-time view of the injection flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSnapshot {
    pub schema_drift: bool,
    pub tool_ambiguity: bool,
    pub currency_mix: bool,
}

/// Live failure-injection flags
#[derive(Debug, Default)]
pub struct FailureInjection {
    schema_drift: AtomicBool,
    tool_ambiguity: AtomicBool,
    currency_mix: AtomicBool,
}

impl FailureInjection {
    /// All modes disabled
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename canonical fields in produced records
    pub fn inject_drift(&self, enabled: bool) {
        self.schema_drift.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "schema drift injection");
    }

    pub fn inject_tool_ambiguity(&self, enabled: bool) {
        self.tool_ambiguity.store(enabled, Ordering::SeqCst);
    }

    /// Turn a share of statuses into 5xx
    pub fn inject_currency_mix(&self, enabled: bool) {
        self.currency_mix.store(enabled, Ordering::SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn schema_drift(&self) -> bool {
        self.schema_drift.load(Ordering::SeqCst)
    }

    /// Current state of every flag
    #[must_use]
    pub fn snapshot(&self) -> FailureSnapshot {
        FailureSnapshot {
            schema_drift: self.schema_drift.load(Ordering::SeqCst),
            tool_ambiguity: self.tool_ambiguity.load(Ordering::SeqCst),
            currency_mix: self.currency_mix.load(Ordering::SeqCst),
        }
    }
}
