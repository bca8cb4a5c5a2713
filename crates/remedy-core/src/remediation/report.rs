//! Diagnosis report shape

use remedy_adapter::Mapping;
use remedy_trace::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of entries in every why-chain
pub const WHY_CHAIN_LEN: usize = 5;

/// Confidence attached to heuristic reports
pub const HEURISTIC_CONFIDENCE: f64 = 0.65;

/// Confidence attached to reports reused from a signature
pub const CACHED_CONFIDENCE: f64 = 0.95;

/// How a report was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisMethod {
    Heuristic,
    External,
    Cached,
}

impl DiagnosisMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::External => "external",
            Self::Cached => "cached",
        }
    }
}

impl fmt::Display for DiagnosisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace excerpt backing a symptom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub step_id: String,
    pub excerpt: String,
}

impl Evidence {
    #[must_use]
    pub fn new(step_id: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Natural-language fix proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedFix {
    pub tool_schema_patch: String,
    pub test_case: String,
}

/// Root-cause report for one failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub primary_cause_step_id: Option<String>,
    pub symptoms: Vec<String>,
    pub evidence: Vec<Evidence>,
    pub why_chain: Vec<String>,
    pub confidence: f64,
    pub proposed_fix: ProposedFix,
    pub method: DiagnosisMethod,
    /// Signature this report was reused from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_from: Option<String>,
    /// Mapping carried over from a signature, applied without re-parsing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_adapter: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub analysis_time_s: f64,
}

impl Report {
    /// Structural checks every report must pass
    ///
    /// # Errors
    /// A description of the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.why_chain.len() != WHY_CHAIN_LEN {
            return Err(format!(
                "why_chain must have {WHY_CHAIN_LEN} entries, got {}",
                self.why_chain.len()
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.method == DiagnosisMethod::Cached
    }
}
