use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;

use arcadia_db::models::UserRow;
use arcadia_types::api::{
    UpdatePreferencesRequest, UpdateProfilePicRequest, UpdateUsernameRequest, UserProfile,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// Shape a user row for the API, decoding the stored preference arrays.
pub(crate) fn user_profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: row.id,
        username: row.username,
        profile_pic: row.profile_pic,
        banner: row.banner,
        platforms: decode_preferences(&row.platforms),
        genres: decode_preferences(&row.genres),
    }
}

fn decode_preferences(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt preference list '{}': {}", raw, e);
        Vec::new()
    })
}

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.list_users().map_err(ApiError::Internal)?;
    let profiles: Vec<UserProfile> = users.into_iter().map(user_profile).collect();
    Ok(Json(profiles))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_username(&username)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(user_profile(user)))
}

pub async fn update_username(
    State(state): State<AppState>,
    Json(req): Json<UpdateUsernameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.old_username.is_empty() || req.new_username.is_empty() {
        return Err(ApiError::Validation("Missing required fields".into()));
    }

    if state
        .db
        .get_user_by_username(&req.new_username)
        .map_err(ApiError::Internal)?
        .is_some()
    {
        return Err(ApiError::Conflict("Username is already taken.".into()));
    }

    let changed = state
        .db
        .update_username(&req.old_username, &req.new_username)
        .map_err(ApiError::Internal)?;
    if changed == 0 {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let user = state
        .db
        .get_user_by_username(&req.new_username)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Username updated successfully.",
        "user": user_profile(user),
    })))
}

pub async fn update_profile_pic(
    State(state): State<AppState>,
    Json(req): Json<UpdateProfilePicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.profile_pic.is_empty() {
        return Err(ApiError::Validation(
            "Username and profile picture are required.".into(),
        ));
    }

    let changed = state
        .db
        .update_profile_pic(&req.username, &req.profile_pic)
        .map_err(ApiError::Internal)?;
    if changed == 0 {
        return Err(ApiError::NotFound("User not found.".into()));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Profile picture updated successfully.",
    })))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() {
        return Err(ApiError::Validation("Username is required.".into()));
    }

    // Absent fields keep their stored value.
    let platforms = encode_preferences(req.platforms.as_deref())?;
    let genres = encode_preferences(req.genres.as_deref())?;

    let changed = state
        .db
        .update_preferences(&req.username, platforms.as_deref(), genres.as_deref())
        .map_err(ApiError::Internal)?;
    if changed == 0 {
        return Err(ApiError::NotFound("User not found.".into()));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Preferences updated successfully.",
    })))
}

fn encode_preferences(values: Option<&[String]>) -> Result<Option<String>, ApiError> {
    values
        .map(|list| {
            serde_json::to_string(list)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!("preference encoding failed: {e}")))
        })
        .transpose()
}
