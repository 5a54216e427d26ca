//! Identity service error types.

use thiserror::Error;

/// Errors produced by the identity service
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Input failed validation; no state was touched
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No record for the given user id
    #[error("User not found: {0}")]
    NotFound(String),

    /// A user with the same name slug is already registered
    #[error("User already exists: {user_id}")]
    AlreadyExists { user_id: String },

    /// Required capability is currently off
    #[error("Operation unavailable: {0}")]
    Unavailable(String),

    /// Face analysis failed (no face, decode error, model down)
    #[error(transparent)]
    Face(#[from] visage_face::FaceError),

    /// Vector index failure that could not be absorbed as degraded mode
    #[error(transparent)]
    Index(#[from] visage_index::IndexError),

    /// Last-resort error; details are audited, not returned
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;
