use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use arcadia_types::api::{AddFriendRequest, Claims, UserProfile};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::users::user_profile;

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let friends = state.db.list_friends(claims.sub).map_err(ApiError::Internal)?;
    let profiles: Vec<UserProfile> = friends.into_iter().map(user_profile).collect();
    Ok(Json(profiles))
}

/// Adds the named user to the caller's friend list; a repeat add is a no-op.
/// Responds with the updated list.
pub async fn add_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddFriendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }

    let friend = state
        .db
        .get_user_by_username(&req.username)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    state
        .db
        .add_friend(claims.sub, friend.id)
        .map_err(ApiError::Internal)?;
    info!("{} added {} as a friend", claims.username, friend.username);

    let friends = state.db.list_friends(claims.sub).map_err(ApiError::Internal)?;
    let profiles: Vec<UserProfile> = friends.into_iter().map(user_profile).collect();
    Ok(Json(profiles))
}

pub async fn friend_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let friend = state
        .db
        .get_friend_profile(claims.sub, &username)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("Friend not found".into()))?;

    Ok(Json(user_profile(friend)))
}
