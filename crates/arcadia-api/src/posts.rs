use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};

use arcadia_db::models::ReplyRow;
use arcadia_types::api::{
    Claims, CreatePostRequest, CreateReplyRequest, PostResponse, ReplyResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::parse_db_timestamp;

const UNKNOWN_GAME: &str = "Unknown Game";

pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    // Run all blocking DB queries off the async runtime
    let db = Arc::clone(&state);
    let (rows, reply_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_posts()?;
        let post_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let reply_rows = db.db.replies_for_posts(&post_ids)?;
        Ok::<_, anyhow::Error>((rows, reply_rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("post listing interrupted"))
    })?
    .map_err(ApiError::Internal)?;

    // Group replies by post id (cheap in-memory work, fine on the async thread)
    let mut reply_map: HashMap<i64, Vec<ReplyRow>> = HashMap::new();
    for reply in reply_rows {
        reply_map.entry(reply.post_id).or_default().push(reply);
    }

    let posts: Vec<PostResponse> = rows
        .into_iter()
        .map(|row| {
            let replies = reply_map
                .remove(&row.id)
                .unwrap_or_default()
                .into_iter()
                .map(reply_response)
                .collect();

            PostResponse {
                id: row.id,
                user_id: row.user_id,
                username: row.username,
                profile_pic: row.profile_pic,
                game_id: row.game_id,
                game_name: row.game_name,
                content: row.content,
                created_at: parse_db_timestamp(&row.created_at),
                replies,
            }
        })
        .collect();

    Ok(Json(posts))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.is_empty() || req.game_id <= 0 {
        return Err(ApiError::Validation("Missing required fields".into()));
    }

    let game_name = resolve_game_name(&state, req.game_id).await?;

    let post_id = state
        .db
        .insert_post(claims.sub, req.game_id, &game_name, &req.content)
        .map_err(ApiError::Internal)?;

    let row = state
        .db
        .get_post(post_id)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("created post {post_id} missing")))?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            profile_pic: row.profile_pic,
            game_id: row.game_id,
            game_name: row.game_name,
            content: row.content,
            created_at: parse_db_timestamp(&row.created_at),
            replies: vec![],
        }),
    ))
}

/// Resolve the game's display name from the local cache, falling back to the
/// catalog. A catalog miss or failure labels the post "Unknown Game" rather
/// than blocking it.
async fn resolve_game_name(state: &AppState, game_id: i64) -> Result<String, ApiError> {
    if let Some(game) = state.db.get_game(game_id).map_err(ApiError::Internal)? {
        return Ok(game.name);
    }

    let name = match state.catalog.game_name(game_id).await {
        Ok(Some(name)) => name,
        Ok(None) => UNKNOWN_GAME.to_string(),
        Err(e) => {
            warn!("Could not resolve game {} from the catalog: {}", game_id, e);
            UNKNOWN_GAME.to_string()
        }
    };

    state
        .db
        .cache_game(game_id, &name)
        .map_err(ApiError::Internal)?;

    Ok(name)
}

pub async fn add_reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
    Json(req): Json<CreateReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.is_empty() {
        return Err(ApiError::Validation("Missing required fields".into()));
    }

    if state.db.get_post(post_id).map_err(ApiError::Internal)?.is_none() {
        return Err(ApiError::NotFound("Post not found".into()));
    }

    let reply_id = state
        .db
        .insert_reply(post_id, claims.sub, &req.content)
        .map_err(ApiError::Internal)?;

    let row = state
        .db
        .get_reply(reply_id)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("created reply {reply_id} missing")))?;

    Ok((StatusCode::CREATED, Json(reply_response(row))))
}

pub async fn get_replies(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .replies_for_post(post_id)
        .map_err(ApiError::Internal)?;

    let replies: Vec<ReplyResponse> = rows.into_iter().map(reply_response).collect();
    Ok(Json(replies))
}

fn reply_response(row: ReplyRow) -> ReplyResponse {
    ReplyResponse {
        id: row.id,
        post_id: row.post_id,
        username: row.username,
        content: row.content,
        created_at: parse_db_timestamp(&row.created_at),
    }
}
