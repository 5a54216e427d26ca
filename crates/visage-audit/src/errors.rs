//! Audit sink error types.

use thiserror::Error;

/// Errors produced by the audit sink
#[derive(Debug, Error)]
pub enum AuditError {
    /// Log directory or file operation failed
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be serialized
    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
