//! Error types for the remediation workflow
//!
//! Covers the failure taxonomy of the closed loop:
//! - empty canary samples
//! - analyzer failures (always recovered internally)
//! - unparseable patches and failed validation
//! - persistence failures in any store

use remedy_adapter::AdapterError;
use remedy_pipeline::PipelineError;
use remedy_trace::TraceError;

/// Result alias for remediation operations
pub type Result<T> = std::result::Result<T, RemedyError>;

/// Main remediation error type
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    /// No records were available to validate against
    #[error("no events to test")]
    IngestionEmpty,

    /// External analyzer unreachable, slow or malformed
    #[error("diagnosis unavailable: {0}")]
    DiagnosisUnavailable(String),

    /// No field mapping could be extracted from a proposed fix
    #[error("could not parse adapter from report")]
    PatchUnparseable,

    /// Canary thresholds violated
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Persistence failure outside the lower crates
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// Trace store error
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),

    /// Adapter registry error
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Pipeline error
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Workflow state machine violation
    #[error("invalid workflow transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl RemedyError {
    /// Expected outcomes the workflow handles without surfacing a fault
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IngestionEmpty
                | Self::DiagnosisUnavailable(_)
                | Self::PatchUnparseable
                | Self::ValidationFailed(_)
        )
    }

    /// Persistence I/O failure on events, runs, adapters or signatures
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        match self {
            Self::StoreFailure(_) | Self::Adapter(_) => true,
            Self::Trace(e) => e.is_storage_failure(),
            Self::Pipeline(PipelineError::Trace(e)) => e.is_storage_failure(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for RemedyError {
    fn from(e: std::io::Error) -> Self {
        Self::StoreFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(RemedyError::PatchUnparseable.is_recoverable());
        assert!(RemedyError::DiagnosisUnavailable("timeout".into()).is_recoverable());
        assert!(!RemedyError::StoreFailure("disk full".into()).is_recoverable());
    }

    #[test]
    fn io_errors_are_store_failures() {
        let err: RemedyError = std::io::Error::other("denied").into();
        assert!(err.is_store_failure());
        assert!(!RemedyError::IngestionEmpty.is_store_failure());
    }

    #[test]
    fn display_messages() {
        assert_eq!(RemedyError::IngestionEmpty.to_string(), "no events to test");
        assert_eq!(
            RemedyError::InvalidTransition {
                from: "start",
                to: "canary"
            }
            .to_string(),
            "invalid workflow transition: start -> canary"
        );
    }
}
