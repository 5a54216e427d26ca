//! Face analysis error types.

use thiserror::Error;

/// Errors produced by face detection and embedding extraction
#[derive(Debug, Error)]
pub enum FaceError {
    /// Image bytes could not be decoded
    #[error("Image decode failed: {0}")]
    DecodeError(String),

    /// Detector ran but found no usable face
    #[error("No face detected in the image")]
    NoFaceDetected,

    /// Backend produced an embedding with the wrong dimensionality
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    EmbeddingDimension { expected: usize, got: usize },

    /// Detector model is not loaded or failed
    #[error("Face model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Result type for face analysis operations
pub type Result<T> = std::result::Result<T, FaceError>;
