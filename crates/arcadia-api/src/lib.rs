pub mod auth;
pub mod error;
pub mod friends;
pub mod games;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod posts;
pub mod users;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert.
pub(crate) fn parse_db_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
