//! Error types for the edges of the progress tree.
//!
//! Tree operations themselves never fail: negative counters, dead portions
//! and repeated adds are all valid states. Errors only arise while validating
//! construction parameters or loading configuration.

/// Error type for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors that can occur outside the tree mutation path.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Granularity outside (0, 1]
    #[error("Invalid granularity {0}: must be in (0, 1]")]
    InvalidGranularity(f64),

    /// Configuration value out of range or unparseable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
