//! The shared catalog access credential.
//!
//! At most one credential is live per process. It is replaced wholesale on
//! each successful exchange; concurrent readers observe either the old or the
//! new credential, never a mix. Concurrent refreshes after expiry may race.
//! The exchange is idempotent, so at-least-one-refresh suffices and no
//! single-flight coordination is used.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::CatalogConfig;
use crate::error::CatalogError;

/// Time source, injectable so expiry can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A bearer token and the moment it stops being valid.
#[derive(Debug, Clone)]
struct AccessCredential {
    token: String,
    expires_at: i64,
}

/// Result of one successful client-credentials exchange.
#[derive(Debug, Clone)]
pub struct Grant {
    pub access_token: String,
    pub expires_in: i64,
}

/// The credential exchange itself, injectable for tests.
pub trait TokenExchange: Send + Sync {
    fn exchange(&self) -> impl Future<Output = Result<Grant, CatalogError>> + Send;
}

/// Production exchange: POSTs the client id/secret pair to the identity
/// endpoint as a `client_credentials` grant.
pub struct ClientCredentialsExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

impl ClientCredentialsExchange {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                CatalogError::CredentialExchange(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

impl TokenExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<Grant, CatalogError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| {
                CatalogError::CredentialExchange(format!("identity endpoint unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(CatalogError::CredentialExchange(format!(
                "identity endpoint returned {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            CatalogError::CredentialExchange(format!("identity response unreadable: {e}"))
        })?;

        grant_from_json(&body)
    }
}

/// A grant without an access token is a hard failure.
fn grant_from_json(body: &str) -> Result<Grant, CatalogError> {
    let parsed: ExchangeResponse = serde_json::from_str(body).map_err(|e| {
        CatalogError::CredentialExchange(format!("identity response was not JSON: {e}"))
    })?;

    let access_token = parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            CatalogError::CredentialExchange("response did not contain an access token".into())
        })?;

    Ok(Grant {
        access_token,
        expires_in: parsed.expires_in.unwrap_or(0),
    })
}

/// Caches the shared bearer credential until its advertised expiry.
pub struct TokenCache<E, C = SystemClock> {
    exchange: E,
    clock: C,
    credential: RwLock<Option<AccessCredential>>,
}

impl<E: TokenExchange> TokenCache<E, SystemClock> {
    pub fn new(exchange: E) -> Self {
        Self::with_clock(exchange, SystemClock)
    }
}

impl<E: TokenExchange, C: Clock> TokenCache<E, C> {
    pub fn with_clock(exchange: E, clock: C) -> Self {
        Self {
            exchange,
            clock,
            credential: RwLock::new(None),
        }
    }

    /// Returns the cached token while it is still valid; otherwise performs
    /// one credential exchange and caches the result.
    pub async fn get_token(&self) -> Result<String, CatalogError> {
        {
            let slot = self.credential.read().await;
            if let Some(credential) = &*slot {
                if self.clock.now_unix() < credential.expires_at {
                    return Ok(credential.token.clone());
                }
            }
        }

        let grant = self.exchange.exchange().await?;
        let expires_in = grant.expires_in;
        let credential = AccessCredential {
            token: grant.access_token,
            expires_at: self.clock.now_unix() + expires_in,
        };
        let token = credential.token.clone();

        *self.credential.write().await = Some(credential);
        info!("Obtained catalog access token, valid for {}s", expires_in);

        Ok(token)
    }

    /// Clears the credential so the next `get_token` exchanges afresh.
    /// Called when the catalog rejects the current token.
    pub async fn invalidate(&self) {
        *self.credential.write().await = None;
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeClock, FakeExchange};
    use super::*;

    #[tokio::test]
    async fn token_is_cached_until_expiry() {
        let clock = FakeClock::at(1_000);
        let exchange =
            FakeExchange::scripted(vec![FakeExchange::grant("abc", 3600), FakeExchange::grant("def", 3600)]);
        let cache = TokenCache::with_clock(&exchange, &clock);

        assert_eq!(cache.get_token().await.unwrap(), "abc");
        assert_eq!(cache.get_token().await.unwrap(), "abc");
        assert_eq!(exchange.call_count(), 1);

        // One second before expiry the cached token is still served.
        clock.set(1_000 + 3599);
        assert_eq!(cache.get_token().await.unwrap(), "abc");
        assert_eq!(exchange.call_count(), 1);

        // Past expiry a single new exchange happens.
        clock.set(1_000 + 3601);
        assert_eq!(cache.get_token().await.unwrap(), "def");
        assert_eq!(exchange.call_count(), 2);

        // And the replacement credential has its own future expiry.
        assert_eq!(cache.get_token().await.unwrap(), "def");
        assert_eq!(exchange.call_count(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_exchange() {
        let clock = FakeClock::at(50);
        let exchange =
            FakeExchange::scripted(vec![FakeExchange::grant("first", 3600), FakeExchange::grant("second", 3600)]);
        let cache = TokenCache::with_clock(&exchange, &clock);

        assert_eq!(cache.get_token().await.unwrap(), "first");

        // Expiry is far away, but invalidation still forces an exchange.
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "second");
        assert_eq!(exchange.call_count(), 2);
    }

    #[tokio::test]
    async fn failed_exchange_surfaces_and_caches_nothing() {
        let clock = FakeClock::at(0);
        let exchange = FakeExchange::scripted(vec![
            Err(CatalogError::CredentialExchange("boom".into())),
            FakeExchange::grant("later", 60),
        ]);
        let cache = TokenCache::with_clock(&exchange, &clock);

        assert!(matches!(
            cache.get_token().await,
            Err(CatalogError::CredentialExchange(_))
        ));

        // The failure was not cached; the next call exchanges again.
        assert_eq!(cache.get_token().await.unwrap(), "later");
        assert_eq!(exchange.call_count(), 2);
    }

    #[test]
    fn grant_without_access_token_is_an_error() {
        let err = grant_from_json(r#"{"expires_in": 3600}"#).unwrap_err();
        assert!(matches!(err, CatalogError::CredentialExchange(_)));

        let err = grant_from_json(r#"{"access_token": "", "expires_in": 3600}"#).unwrap_err();
        assert!(matches!(err, CatalogError::CredentialExchange(_)));
    }

    #[test]
    fn grant_parses_token_and_ttl() {
        let grant = grant_from_json(r#"{"access_token": "abc", "expires_in": 3600}"#).unwrap();
        assert_eq!(grant.access_token, "abc");
        assert_eq!(grant.expires_in, 3600);
    }
}
