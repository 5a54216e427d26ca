//! Vector index error types.

use thiserror::Error;

/// Errors produced by the vector index
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying store operation failed
    #[error("Index database error: {0}")]
    Database(String),

    /// Filesystem error while opening or reconciling
    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row could not be (de)serialized
    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding is not unit length
    #[error("Embedding is not L2-normalized (norm = {norm})")]
    NotNormalized { norm: f32 },

    /// Embedding has the wrong dimensionality
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// No record for the given user id
    #[error("User not found: {0}")]
    NotFound(String),
}

impl IndexError {
    /// Whether an open failure is a transient fault (locked or busy store)
    /// that should put the index into degraded mode rather than unavailable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            IndexError::Database(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("lock") || msg.contains("temporarily") || msg.contains("busy")
            }
            IndexError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;
