//! Remediation configuration
//!
//! Every field has a default, so a partial TOML file (or none at all) is
//! valid:
//!
//! ```toml
//! data_dir = "/var/lib/remedy"
//! canary_sample_size = 50
//!
//! [thresholds]
//! max_error_rate = 0.05
//! ```

use crate::error::{RemedyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Promotion thresholds shared by the canary and the decision gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Highest tolerated canary error rate, inclusive
    pub max_error_rate: f64,
    /// Highest tolerated p95 replay latency, inclusive
    pub max_p95_latency_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.01,
            max_p95_latency_ms: 500.0,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    /// Root for runs, adapter config and signatures
    pub data_dir: PathBuf,
    pub thresholds: Thresholds,
    /// Default number of records replayed by the canary
    pub canary_sample_size: usize,
    /// Minimum cosine similarity for a signature match
    pub similarity_threshold: f64,
    /// Fixed human MTTR recorded next to the automated one
    pub human_baseline_mttr_s: f64,
    pub analyzer_timeout_ms: u64,
    /// Events forwarded to an external analyzer
    pub analyzer_trace_prefix: usize,
    pub ingestion_capacity: usize,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            thresholds: Thresholds::default(),
            canary_sample_size: 20,
            similarity_threshold: 0.85,
            human_baseline_mttr_s: 150.0,
            analyzer_timeout_ms: 30_000,
            analyzer_trace_prefix: 50,
            ingestion_capacity: 1000,
        }
    }
}

impl RemedyConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// `Config` on syntax errors or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RemedyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `StoreFailure` if unreadable, `Config` if invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values no component can work with
    ///
    /// # Errors
    /// `Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.thresholds.max_error_rate) {
            return Err(RemedyError::Config(
                "thresholds.max_error_rate must be within [0, 1]".into(),
            ));
        }
        if self.thresholds.max_p95_latency_ms.is_nan() || self.thresholds.max_p95_latency_ms < 0.0 {
            return Err(RemedyError::Config(
                "thresholds.max_p95_latency_ms must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RemedyError::Config(
                "similarity_threshold must be within [0, 1]".into(),
            ));
        }
        if self.ingestion_capacity == 0 {
            return Err(RemedyError::Config("ingestion_capacity must be positive".into()));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_canary_sample_size(mut self, n: usize) -> Self {
        self.canary_sample_size = n;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.analyzer_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_millis(self.analyzer_timeout_ms)
    }

    /// Directory holding `runs.json` and per-run JSONL logs
    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    #[must_use]
    pub fn adapter_path(&self) -> PathBuf {
        self.data_dir.join("adapter_config.json")
    }

    #[must_use]
    pub fn signatures_path(&self) -> PathBuf {
        self.data_dir.join("signatures.json")
    }
}
