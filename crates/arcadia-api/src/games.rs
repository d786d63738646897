use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::DateTime;
use serde::Deserialize;

use arcadia_catalog::GameFilters;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GameSearchParams {
    pub search: Option<String>,
    /// Comma-separated catalog ids, as sent by the filter sidebar.
    pub genres: Option<String>,
    pub themes: Option<String>,
    pub platforms: Option<String>,
    pub esrb: Option<u64>,
    pub mode: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

impl GameSearchParams {
    fn into_filters(self) -> GameFilters {
        GameFilters {
            search: self.search.filter(|s| !s.is_empty()),
            genres: parse_id_list(self.genres.as_deref()),
            themes: parse_id_list(self.themes.as_deref()),
            platforms: parse_id_list(self.platforms.as_deref()),
            esrb: self.esrb,
            game_modes: parse_id_list(self.mode.as_deref()),
            page: self.page,
        }
    }
}

fn parse_id_list(raw: Option<&str>) -> Vec<u64> {
    raw.map(|list| {
        list.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    })
    .unwrap_or_default()
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<GameSearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = params.into_filters();
    let mut games = state.catalog.search_games(&filters).await?;

    if let Some(games) = games.as_array_mut() {
        for game in games {
            let release_date = format_release_date(
                game.get("first_release_date").and_then(|ts| ts.as_i64()),
            );
            if let Some(game) = game.as_object_mut() {
                game.insert("releaseDate".into(), release_date.into());
            }
        }
    }

    Ok(Json(games))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let game = state
        .catalog
        .game_details(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Game not found".into()))?;

    Ok(Json(game))
}

/// Catalog release dates are unix seconds; the client wants `YYYY-MM-DD`.
fn format_release_date(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
