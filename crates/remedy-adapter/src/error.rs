//! Error types for the adapter registry

/// Result alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Adapter persistence errors
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Reading, writing or removing the config file failed
    #[error("adapter config i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not a JSON object of strings
    #[error("adapter config is malformed: {0}")]
    Serde(#[from] serde_json::Error),

    /// A target field is also the source of another pair
    #[error("adapter field '{field}' is both a rename source and a rename target")]
    ChainedMapping {
        /// The field that appears on both sides
        field: String,
    },
}
