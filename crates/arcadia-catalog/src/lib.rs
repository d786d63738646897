//! Client for the external game-catalog API (IGDB behind Twitch identity).
//!
//! The catalog authenticates with a short-lived bearer token obtained through
//! a client-credentials exchange. [`TokenCache`] holds the single shared
//! credential for the process and refreshes it on expiry or on an upstream
//! 401; [`CatalogClient`] runs queries under that protocol.

pub mod client;
pub mod error;
pub mod query;
pub mod token;

pub use client::{CatalogClient, CatalogTransport, HttpTransport, IgdbClient, UpstreamResponse};
pub use error::CatalogError;
pub use query::GameFilters;
pub use token::{ClientCredentialsExchange, Clock, SystemClock, TokenCache, TokenExchange};

const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const DEFAULT_API_BASE_URL: &str = "https://api.igdb.com/v4";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_base_url: String,
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self, CatalogError> {
        Ok(Self {
            client_id: env_required("TWITCH_CLIENT_ID")?,
            client_secret: env_required("TWITCH_CLIENT_SECRET")?,
            token_url: env_or_default("TWITCH_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_base_url: env_or_default("IGDB_API_BASE_URL", DEFAULT_API_BASE_URL),
        })
    }
}

fn env_required(name: &str) -> Result<String, CatalogError> {
    std::env::var(name).map_err(|_| CatalogError::MissingConfig(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
