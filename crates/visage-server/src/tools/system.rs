//! Health and token introspection tools.

use super::{authenticate, parse_params};
use crate::error::ToolFailure;
use crate::state::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use visage_audit::{AuditEvent, AuditEventType, AuditOutcome};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenOnlyParams {
    access_token: String,
}

/// `get_health_status` — available regardless of component health.
pub async fn get_health_status(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: TokenOnlyParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    let snapshot = state.health.snapshot().await;

    state.audit.log(
        AuditEvent::new(
            AuditEventType::DatabaseQuery,
            AuditOutcome::Success,
            &client_id,
        )
        .with_info("operation", "get_health_status"),
    );

    serde_json::to_value(&snapshot)
        .map_err(|e| crate::error::internal_failure(&e.to_string(), false))
}

/// `issue_token_info` — verification-only introspection of the presented
/// token. Token issuance itself is an out-of-band admin action.
pub async fn issue_token_info(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: TokenOnlyParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    let claims = state
        .authority
        .token_info(&params.access_token)
        .map_err(|_| ToolFailure::unauthenticated("invalid access token"))?;

    state.audit.log(
        AuditEvent::new(AuditEventType::AuthSuccess, AuditOutcome::Success, &client_id)
            .with_info("operation", "issue_token_info"),
    );

    Ok(json!({
        "client_id": claims.sub,
        "issued_at": claims.iat,
        "expires_at": claims.exp,
        "scope": claims.scope,
    }))
}
