//! Error types for the pipeline

use remedy_trace::TraceError;

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline failures that abort a run
///
/// Per-record evaluation failures are not among these; they are contained
/// by the audit stage as [`EvalError`] values.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Trace store rejected an append or metric write
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),

    /// Ingestion sink refused a record
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// Background worker could not be started
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Per-record evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Record lacks a field the evaluator requires
    #[error("missing field '{field}'")]
    MissingField {
        /// Name of the absent field
        field: String,
    },
}
