//! Error types for the trace store

/// Result alias for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Trace store errors
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Metric key outside the allow-list
    #[error("invalid metric key: {key}")]
    InvalidKey {
        /// Rejected key
        key: String,
    },

    /// Metric value has the wrong shape for its key
    #[error("invalid value for metric {key}: {reason}")]
    InvalidValue {
        /// Metric key
        key: String,
        /// What was wrong
        reason: String,
    },

    /// Run id not known to the store
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// Unknown run status string
    #[error("unknown run status: {0}")]
    UnknownStatus(String),

    /// Filesystem failure while persisting runs or events
    #[error("trace i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failure of a persisted record
    #[error("trace serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl TraceError {
    /// Whether the error came from durable storage rather than caller input
    #[inline]
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serde(_))
    }
}
