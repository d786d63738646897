use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use arcadia_types::api::{Claims, MessageResponse, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::parse_db_timestamp;

/// Both directions of the conversation with the named user, newest first.
pub async fn conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let other = state
        .db
        .get_user_by_username(&username)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    // Run the blocking DB read off the async runtime
    let db = Arc::clone(&state);
    let user_id = claims.sub;
    let other_id = other.id;
    let rows = tokio::task::spawn_blocking(move || db.db.conversation(user_id, other_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("conversation query interrupted"))
        })?
        .map_err(ApiError::Internal)?;

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| MessageResponse {
            id: row.id,
            sender: row.sender_username,
            recipient: row.recipient_username,
            body: row.body,
            created_at: parse_db_timestamp(&row.created_at),
        })
        .collect();

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.message.is_empty() {
        return Err(ApiError::Validation("Message is required!".into()));
    }

    let recipient = state
        .db
        .get_user_by_username(&username)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    state
        .db
        .insert_message(claims.sub, recipient.id, &req.message)
        .map_err(ApiError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Message sent successfully!",
        })),
    ))
}
