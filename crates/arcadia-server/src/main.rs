use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use arcadia_api::auth::{self, AppState, AppStateInner};
use arcadia_api::middleware::require_auth;
use arcadia_api::{friends, games, health, messages, posts, users};
use arcadia_catalog::{CatalogConfig, IgdbClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcadia=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ARCADIA_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("ARCADIA_DB_PATH").unwrap_or_else(|_| "arcadia.db".into());
    let host = std::env::var("ARCADIA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ARCADIA_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;

    // Init database
    let db = arcadia_db::Database::open(&PathBuf::from(&db_path))?;

    // Outbound catalog client (Twitch identity + IGDB)
    let catalog = IgdbClient::from_config(&CatalogConfig::from_env()?)?;

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        catalog,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/games/search", get(games::search))
        .route("/api/games/{id}", get(games::detail))
        .route("/api/health", get(health::health))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/users/update-username", post(users::update_username))
        .route("/api/users/update-profile-pic", post(users::update_profile_pic))
        .route("/api/users/update-preferences", post(users::update_preferences))
        .route("/api/users/{username}", get(users::get_profile))
        .route(
            "/api/friends",
            get(friends::list_friends).post(friends::add_friend),
        )
        .route("/api/friends/{username}", get(friends::friend_profile))
        .route(
            "/api/messages/{username}",
            get(messages::conversation).post(messages::send_message),
        )
        .route("/api/posts", get(posts::list_posts).post(posts::create_post))
        .route("/api/posts/{id}/reply", post(posts::add_reply))
        .route("/api/posts/{id}/replies", get(posts::get_replies))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Arcadia server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
