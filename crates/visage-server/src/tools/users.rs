//! Biometric user lifecycle tools.

use super::{authenticate, parse_params, require_capability, Requirement};
use crate::error::ToolFailure;
use crate::state::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use visage_core::{validate, RecognizeOutcome, RegisterOutcome};
use visage_index::UserProfile;

/// Minimum accepted base64 payload length for an image.
const MIN_IMAGE_DATA_LEN: usize = 100;
const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

fn user_value(user: &UserProfile) -> Value {
    json!({
        "user_id": user.user_id,
        "name": user.name,
        "metadata": user.metadata,
        "registration_timestamp": user.registration_timestamp,
        "last_recognized_timestamp": user.last_recognized_timestamp,
        "recognition_count": user.recognition_count,
        "detection_score": user.detection_score,
        "face_quality": user.face_quality,
    })
}

fn validate_image_data(image_data: &str) -> Result<(), ToolFailure> {
    if image_data.len() < MIN_IMAGE_DATA_LEN {
        return Err(ToolFailure::validation(format!(
            "image_data must be at least {} base64 characters, got {}",
            MIN_IMAGE_DATA_LEN,
            image_data.len()
        )));
    }
    Ok(())
}

fn validate_user_id(user_id: &str) -> Result<(), ToolFailure> {
    if user_id.is_empty() || user_id.len() > 100 {
        return Err(ToolFailure::validation(
            "user_id must be 1-100 characters".to_string(),
        ));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// register_user
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterUserParams {
    access_token: String,
    name: String,
    image_data: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

pub async fn register_user(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: RegisterUserParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    validate::validate_name(&params.name).map_err(|e| ToolFailure::validation(e.to_string()))?;
    validate_image_data(&params.image_data)?;
    validate::validate_metadata(&params.metadata)
        .map_err(|e| ToolFailure::validation(e.to_string()))?;

    require_capability(state, Requirement::Register).await?;

    let outcome = state
        .service
        .register(&client_id, &params.name, &params.image_data, params.metadata)
        .await?;

    Ok(match outcome {
        RegisterOutcome::Registered { user } => json!({
            "status": "registered",
            "user": user_value(&user),
        }),
        RegisterOutcome::Queued {
            name,
            queue_position,
        } => json!({
            "status": "queued",
            "user": { "name": name, "queue_position": queue_position },
        }),
        RegisterOutcome::AlreadyExists { user } => json!({
            "status": "already_exists",
            "user": user_value(&user),
        }),
    })
}

// ----------------------------------------------------------------------
// recognize_face
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecognizeFaceParams {
    access_token: String,
    image_data: String,
    confidence_threshold: Option<f32>,
}

pub async fn recognize_face(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: RecognizeFaceParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    validate_image_data(&params.image_data)?;
    if let Some(threshold) = params.confidence_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ToolFailure::validation(
                "confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
    }

    require_capability(state, Requirement::Recognize).await?;

    let outcome = state
        .service
        .recognize(&client_id, &params.image_data, params.confidence_threshold)
        .await?;

    Ok(match outcome {
        RecognizeOutcome::Recognized {
            user,
            distance,
            threshold,
        } => json!({
            "status": "recognized",
            "distance": distance,
            "threshold": threshold,
            "user": user_value(&user),
        }),
        RecognizeOutcome::NotRecognized {
            distance,
            threshold,
        } => json!({
            "status": "not_recognized",
            "distance": distance,
            "threshold": threshold,
        }),
    })
}

// ----------------------------------------------------------------------
// list_users
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListUsersParams {
    access_token: String,
    limit: Option<usize>,
    offset: Option<usize>,
}

pub async fn list_users(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: ListUsersParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(ToolFailure::validation(format!(
            "limit must be within 1..={}",
            MAX_LIST_LIMIT
        )));
    }
    let offset = params.offset.unwrap_or(0);

    require_capability(state, Requirement::Recognize).await?;

    let page = state.service.list(&client_id, offset, limit).await?;
    let users: Vec<Value> = page.users.iter().map(user_value).collect();

    Ok(json!({
        "total": page.total,
        "count": users.len(),
        "offset": offset,
        "limit": limit,
        "has_more": page.has_more,
        "users": users,
    }))
}

// ----------------------------------------------------------------------
// get_user_profile
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetUserProfileParams {
    access_token: String,
    user_id: String,
}

pub async fn get_user_profile(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: GetUserProfileParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    validate_user_id(&params.user_id)?;
    require_capability(state, Requirement::Recognize).await?;

    let profile = state.service.get_profile(&client_id, &params.user_id).await?;
    Ok(user_value(&profile))
}

// ----------------------------------------------------------------------
// update_user
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateUserParams {
    access_token: String,
    user_id: String,
    name: Option<String>,
    metadata: Option<BTreeMap<String, String>>,
}

pub async fn update_user(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: UpdateUserParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    validate_user_id(&params.user_id)?;
    if params.name.is_none() && params.metadata.is_none() {
        return Err(ToolFailure::validation(
            "update_user requires a name or metadata".to_string(),
        ));
    }
    if let Some(ref name) = params.name {
        validate::validate_name(name).map_err(|e| ToolFailure::validation(e.to_string()))?;
    }
    if let Some(ref metadata) = params.metadata {
        validate::validate_metadata(metadata)
            .map_err(|e| ToolFailure::validation(e.to_string()))?;
    }

    require_capability(state, Requirement::Register).await?;

    let user = state
        .service
        .update(
            &client_id,
            &params.user_id,
            params.name.as_deref(),
            params.metadata,
        )
        .await?;

    Ok(json!({ "status": "ok", "user": user_value(&user) }))
}

// ----------------------------------------------------------------------
// delete_user
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteUserParams {
    access_token: String,
    user_id: String,
}

pub async fn delete_user(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: DeleteUserParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    validate_user_id(&params.user_id)?;
    require_capability(state, Requirement::Register).await?;

    state.service.delete(&client_id, &params.user_id).await?;
    Ok(json!({ "status": "ok" }))
}

// ----------------------------------------------------------------------
// get_database_stats
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetStatsParams {
    access_token: String,
}

pub async fn get_database_stats(state: &AppState, params: Value) -> Result<Value, ToolFailure> {
    let params: GetStatsParams = parse_params(params)?;
    let client_id = authenticate(state, &params.access_token).await?;

    require_capability(state, Requirement::Recognize).await?;

    let stats = state.service.stats(&client_id).await?;
    serde_json::to_value(stats)
        .map_err(|e| crate::error::internal_failure(&e.to_string(), false))
}
