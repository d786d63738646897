use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// Liveness probe that also checks the database is reachable.
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.db.ping().map_err(ApiError::Internal)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
