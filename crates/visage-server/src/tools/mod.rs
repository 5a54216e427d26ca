//! Tool dispatch: authenticate, validate, gate on capability, execute.

pub mod system;
pub mod users;

use crate::error::{ToolErrorKind, ToolFailure};
use crate::state::AppState;
use serde_json::Value;
use std::sync::Arc;
use visage_audit::{AuditEvent, AuditEventType, AuditOutcome};
use visage_crypto::CryptoError;
use visage_health::Component;

/// Capability a tool requires before it may touch the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// `can_register`, or `can_queue_registration` for queued writes
    Register,
    /// `can_recognize`
    Recognize,
    /// No capability gate (health, token introspection)
    Always,
}

/// Routes JSON-RPC methods to tool handlers.
pub struct ToolRouter {
    state: Arc<AppState>,
}

impl ToolRouter {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Dispatch one tool call. Returns `None` for unknown methods so the
    /// transport can answer with a protocol-level error.
    pub async fn dispatch(&self, method: &str, params: Value) -> Option<Value> {
        let state = &self.state;
        let outcome = match method {
            "register_user" => users::register_user(state, params).await,
            "recognize_face" => users::recognize_face(state, params).await,
            "list_users" => users::list_users(state, params).await,
            "get_user_profile" => users::get_user_profile(state, params).await,
            "update_user" => users::update_user(state, params).await,
            "delete_user" => users::delete_user(state, params).await,
            "get_database_stats" => users::get_database_stats(state, params).await,
            "get_health_status" => system::get_health_status(state, params).await,
            "issue_token_info" => system::issue_token_info(state, params).await,
            _ => return None,
        };

        Some(match outcome {
            Ok(result) => result,
            Err(failure) => {
                if !failure.audited {
                    self.audit_rejection(method, &failure);
                }
                failure.into_value()
            }
        })
    }

    /// Audit a tool call that outlived its deadline. The dispatch future is
    /// dropped on expiry, so no deeper audit ever runs for it.
    pub fn audit_timeout(&self, method: &str, deadline_secs: u64) {
        self.state.audit.log(
            AuditEvent::new(event_type_for(method), AuditOutcome::Failure, "unknown")
                .with_info("tool", method)
                .with_error(&format!("request deadline of {}s exceeded", deadline_secs)),
        );
    }

    fn audit_rejection(&self, method: &str, failure: &ToolFailure) {
        let (event_type, outcome) = match failure.kind {
            ToolErrorKind::Unauthenticated => (AuditEventType::AuthFailure, AuditOutcome::Denied),
            ToolErrorKind::Internal => (event_type_for(method), AuditOutcome::Failure),
            _ => (event_type_for(method), AuditOutcome::Denied),
        };
        self.state.audit.log(
            AuditEvent::new(event_type, outcome, "unknown")
                .with_info("tool", method)
                .with_error(&failure.message),
        );
    }
}

fn event_type_for(method: &str) -> AuditEventType {
    match method {
        "register_user" => AuditEventType::Registration,
        "recognize_face" => AuditEventType::Recognition,
        "delete_user" => AuditEventType::Deletion,
        "update_user" => AuditEventType::UserUpdate,
        "get_user_profile" => AuditEventType::ProfileAccess,
        _ => AuditEventType::DatabaseQuery,
    }
}

/// Verify a bearer token and return the authenticated client id.
pub async fn authenticate(state: &AppState, token: &str) -> Result<String, ToolFailure> {
    if token.is_empty() {
        return Err(ToolFailure::unauthenticated("access_token is required"));
    }

    state.authority.verify_token(token).map_err(|e| match e {
        CryptoError::Expired => ToolFailure::unauthenticated("access token expired"),
        CryptoError::DisabledClient => ToolFailure::unauthenticated("client is disabled"),
        _ => ToolFailure::unauthenticated("invalid access token"),
    })
}

/// Enforce the tool's capability requirement against current health.
pub async fn require_capability(
    state: &AppState,
    requirement: Requirement,
) -> Result<(), ToolFailure> {
    let capabilities = state.health.capabilities().await;
    let allowed = match requirement {
        Requirement::Register => capabilities.can_register || capabilities.can_queue_registration,
        Requirement::Recognize => capabilities.can_recognize,
        Requirement::Always => true,
    };

    if allowed {
        return Ok(());
    }

    // Name the component that took the capability away
    let component = match requirement {
        Requirement::Recognize | Requirement::Register => {
            let face = state.health.status_of(Component::FaceModel).await;
            if face != visage_health::HealthStatus::Healthy {
                Component::FaceModel
            } else {
                Component::VectorIndex
            }
        }
        Requirement::Always => unreachable!("Always is never denied"),
    };
    let message = state.health.message_of(component).await;
    Err(ToolFailure::unavailable(format!(
        "{}: {}",
        component.as_str(),
        message
    )))
}

/// Deserialize tool params, mapping failures to validation errors.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolFailure> {
    serde_json::from_value(params).map_err(|e| ToolFailure::validation(format!("bad params: {}", e)))
}
