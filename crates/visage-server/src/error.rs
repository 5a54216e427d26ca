//! Tool-level error shaping.
//!
//! Tool failures ride inside the JSON-RPC `result` as
//! `{status:"error", kind, message}`; success responses return the
//! operation's result object directly with no envelope.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use visage_core::IdentityError;

/// Error kinds exposed on the tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Unauthenticated,
    Unavailable,
    Validation,
    NotFound,
    AlreadyExists,
    Internal,
}

/// A failed tool invocation.
#[derive(Debug)]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
    /// Whether the identity service already emitted the audit line for this
    /// failure. Pre-service rejections have not been audited yet.
    pub audited: bool,
}

impl ToolFailure {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Validation,
            message: message.into(),
            audited: false,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Unauthenticated,
            message: message.into(),
            audited: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Unavailable,
            message: message.into(),
            audited: false,
        }
    }

    /// Shape as the wire object.
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "status": "error",
            "kind": self.kind,
            "message": self.message,
        })
    }
}

impl From<IdentityError> for ToolFailure {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::Validation(message) => Self {
                kind: ToolErrorKind::Validation,
                message,
                audited: false,
            },
            // Face analysis problems surface as validation for client
            // clarity; the service audited them with a biometric summary
            IdentityError::Face(e) => Self {
                kind: ToolErrorKind::Validation,
                message: e.to_string(),
                audited: true,
            },
            IdentityError::NotFound(id) => Self {
                kind: ToolErrorKind::NotFound,
                message: format!("user not found: {}", id),
                audited: true,
            },
            IdentityError::AlreadyExists { user_id } => Self {
                kind: ToolErrorKind::AlreadyExists,
                message: format!("user already exists: {}", user_id),
                audited: true,
            },
            IdentityError::Unavailable(message) => Self {
                kind: ToolErrorKind::Unavailable,
                message,
                audited: false,
            },
            IdentityError::Index(e) => internal_failure(&e.to_string(), true),
            IdentityError::Internal(message) => internal_failure(&message, false),
        }
    }
}

/// Internal errors return an opaque reference; the detail goes to the audit
/// log, never to the caller.
pub fn internal_failure(detail: &str, audited: bool) -> ToolFailure {
    let reference = Uuid::new_v4().simple().to_string();
    tracing::error!(reference = %reference, "Internal tool error: {}", detail);
    ToolFailure {
        kind: ToolErrorKind::Internal,
        message: format!("internal error (ref {})", &reference[..8]),
        audited,
    }
}
