//! Run and event data model
//!
//! Events serialize to the flat wire shape
//! `{ts, run_id, idx, type, ...type fields}` so persisted JSONL lines can be
//! read by anything that understands the trace format.

use crate::error::TraceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Unique run identifier (`run_<12 hex>`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run id
    #[must_use]
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("run_{}", &hex[..12]))
    }

    /// Borrow the id as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Pipeline still executing
    Running,
    /// Completed without audit errors
    Ok,
    /// At least one record failed audit
    Failed,
}

impl RunStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "ok" => Ok(Self::Ok),
            "failed" => Ok(Self::Failed),
            other => Err(TraceError::UnknownStatus(other.to_string())),
        }
    }
}

/// Run metadata row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub mode: String,
    pub status: RunStatus,
    pub fail_reason: Option<String>,
    pub mttr_human_s: Option<f64>,
    pub mttr_cta_s: Option<f64>,
}

impl Run {
    pub(crate) fn new(mode: impl Into<String>) -> Self {
        Self {
            id: RunId::generate(),
            started_at: Utc::now(),
            mode: mode.into(),
            status: RunStatus::Running,
            fail_reason: None,
            mttr_human_s: None,
            mttr_cta_s: None,
        }
    }
}

/// The only run columns that may be written after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    Status,
    FailReason,
    MttrHumanS,
    MttrCtaS,
}

impl MetricKey {
    /// Every accepted key
    pub const ALL: [MetricKey; 4] = [
        MetricKey::Status,
        MetricKey::FailReason,
        MetricKey::MttrHumanS,
        MetricKey::MttrCtaS,
    ];

    /// Column name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::FailReason => "fail_reason",
            Self::MttrHumanS => "mttr_human_s",
            Self::MttrCtaS => "mttr_cta_s",
        }
    }
}

impl FromStr for MetricKey {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TraceError::InvalidKey { key: s.to_string() })
    }
}

/// One immutable trace entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub ts: f64,
    pub run_id: RunId,
    /// 0-based, strictly increasing per run, assigned by the store
    pub idx: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Type-specific event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    /// A pipeline stage finished
    Step {
        agent: String,
        step_id: String,
        input: Value,
        output: Value,
        latency_ms: u64,
    },
    /// A tool invocation inside a stage
    Tool {
        tool: String,
        args: Value,
        output: Value,
        latency_ms: u64,
    },
    /// A contained failure
    Error { message: String, context: Value },
}

impl EventKind {
    /// Wire name of the event type
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::Tool { .. } => "tool",
            Self::Error { .. } => "error",
        }
    }
}

impl Event {
    /// Shorthand for `self.kind.type_name()`
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}
