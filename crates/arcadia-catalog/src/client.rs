use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CatalogError;
use crate::query::{self, GameFilters};
use crate::token::{ClientCredentialsExchange, Clock, SystemClock, TokenCache, TokenExchange};
use crate::CatalogConfig;

/// Status and body of one upstream catalog response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    fn is_auth_rejection(&self) -> bool {
        self.status == 401
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The wire behind catalog queries, injectable so the retry protocol can be
/// exercised without a network.
pub trait CatalogTransport: Send + Sync {
    fn post(
        &self,
        endpoint: &str,
        token: &str,
        body: &str,
    ) -> impl Future<Output = Result<UpstreamResponse, CatalogError>> + Send;
}

pub struct HttpTransport {
    http: reqwest::Client,
    api_base_url: String,
    client_id: String,
}

impl HttpTransport {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(CatalogError::Http)?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.clone(),
            client_id: config.client_id.clone(),
        })
    }
}

impl CatalogTransport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        token: &str,
        body: &str,
    ) -> Result<UpstreamResponse, CatalogError> {
        let response = self
            .http
            .post(format!("{}/{}", self.api_base_url, endpoint))
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(UpstreamResponse { status, body })
    }
}

/// Issues catalog queries under the bearer protocol: every request carries a
/// token from the cache, and an authentication rejection invalidates the
/// cached credential and retries the request exactly once.
pub struct CatalogClient<T, E, C = SystemClock> {
    transport: T,
    tokens: TokenCache<E, C>,
}

/// The production composition against Twitch identity + IGDB.
pub type IgdbClient = CatalogClient<HttpTransport, ClientCredentialsExchange>;

impl IgdbClient {
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Ok(Self::new(
            HttpTransport::new(config)?,
            TokenCache::new(ClientCredentialsExchange::new(config)?),
        ))
    }
}

impl<T: CatalogTransport, E: TokenExchange, C: Clock> CatalogClient<T, E, C> {
    pub fn new(transport: T, tokens: TokenCache<E, C>) -> Self {
        Self { transport, tokens }
    }

    pub async fn query(&self, endpoint: &str, body: &str) -> Result<serde_json::Value, CatalogError> {
        let token = self.tokens.get_token().await?;
        let mut response = self.transport.post(endpoint, &token, body).await?;

        if response.is_auth_rejection() {
            warn!("Catalog rejected the access token, refreshing and retrying once");
            self.tokens.invalidate().await;
            let token = self.tokens.get_token().await?;
            response = self.transport.post(endpoint, &token, body).await?;

            if response.is_auth_rejection() {
                return Err(CatalogError::AuthenticationRejected);
            }
        }

        if !response.is_success() {
            return Err(CatalogError::Upstream {
                status: response.status,
                body: response.body,
            });
        }

        serde_json::from_str(&response.body).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    pub async fn search_games(&self, filters: &GameFilters) -> Result<serde_json::Value, CatalogError> {
        self.query("games", &query::search_query(filters)).await
    }

    /// The single matching game, or `None` when the catalog knows no such id.
    pub async fn game_details(&self, id: i64) -> Result<Option<serde_json::Value>, CatalogError> {
        let data = self.query("games", &query::detail_query(id)).await?;
        Ok(data.as_array().and_then(|games| games.first()).cloned())
    }

    /// Resolve a game's display name, used when labeling posts.
    pub async fn game_name(&self, id: i64) -> Result<Option<String>, CatalogError> {
        let data = self.query("games", &query::name_query(id)).await?;
        Ok(data
            .as_array()
            .and_then(|games| games.first())
            .and_then(|game| game.get("name"))
            .and_then(|name| name.as_str())
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::fakes::{FakeClock, FakeExchange};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        responses: Mutex<VecDeque<UpstreamResponse>>,
        calls: AtomicUsize,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn scripted(responses: Vec<UpstreamResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                tokens_seen: Mutex::new(Vec::new()),
            }
        }

        fn ok(body: &str) -> UpstreamResponse {
            UpstreamResponse {
                status: 200,
                body: body.to_string(),
            }
        }

        fn rejected() -> UpstreamResponse {
            UpstreamResponse {
                status: 401,
                body: "{\"message\": \"Authorization Failure\"}".to_string(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CatalogTransport for &FakeTransport {
        async fn post(
            &self,
            _endpoint: &str,
            token: &str,
            _body: &str,
        ) -> Result<UpstreamResponse, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens_seen.lock().unwrap().push(token.to_string());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted catalog call"))
        }
    }

    fn client_with<'a>(
        transport: &'a FakeTransport,
        exchange: &'a FakeExchange,
        clock: &'a FakeClock,
    ) -> CatalogClient<&'a FakeTransport, &'a FakeExchange, &'a FakeClock> {
        CatalogClient::new(transport, TokenCache::with_clock(exchange, clock))
    }

    #[tokio::test]
    async fn successful_query_uses_cached_token() {
        let clock = FakeClock::at(0);
        let exchange = FakeExchange::scripted(vec![FakeExchange::grant("tok", 3600)]);
        let transport =
            FakeTransport::scripted(vec![FakeTransport::ok("[{\"id\": 1}]"), FakeTransport::ok("[]")]);
        let client = client_with(&transport, &exchange, &clock);

        let games = client.query("games", "fields id;").await.unwrap();
        assert_eq!(games[0]["id"], 1);

        client.query("games", "fields id;").await.unwrap();
        assert_eq!(exchange.call_count(), 1);
        assert_eq!(*transport.tokens_seen.lock().unwrap(), vec!["tok", "tok"]);
    }

    #[tokio::test]
    async fn auth_rejection_refreshes_and_retries_once() {
        let clock = FakeClock::at(0);
        let exchange =
            FakeExchange::scripted(vec![FakeExchange::grant("stale", 3600), FakeExchange::grant("fresh", 3600)]);
        let transport = FakeTransport::scripted(vec![
            FakeTransport::rejected(),
            FakeTransport::ok("[{\"id\": 2}]"),
        ]);
        let client = client_with(&transport, &exchange, &clock);

        let games = client.query("games", "fields id;").await.unwrap();
        assert_eq!(games[0]["id"], 2);

        assert_eq!(transport.call_count(), 2);
        assert_eq!(exchange.call_count(), 2);
        assert_eq!(*transport.tokens_seen.lock().unwrap(), vec!["stale", "fresh"]);
    }

    #[tokio::test]
    async fn second_rejection_is_terminal() {
        let clock = FakeClock::at(0);
        let exchange =
            FakeExchange::scripted(vec![FakeExchange::grant("one", 3600), FakeExchange::grant("two", 3600)]);
        let transport =
            FakeTransport::scripted(vec![FakeTransport::rejected(), FakeTransport::rejected()]);
        let client = client_with(&transport, &exchange, &clock);

        let err = client.query("games", "fields id;").await.unwrap_err();
        assert!(matches!(err, CatalogError::AuthenticationRejected));

        // Exactly one retry; the second rejection is not retried again.
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn failed_exchange_means_catalog_unavailable() {
        let clock = FakeClock::at(0);
        let exchange = FakeExchange::scripted(vec![Err(CatalogError::CredentialExchange(
            "identity endpoint returned 503".into(),
        ))]);
        let transport = FakeTransport::scripted(vec![]);
        let client = client_with(&transport, &exchange, &clock);

        let err = client.query("games", "fields id;").await.unwrap_err();
        assert!(matches!(err, CatalogError::CredentialExchange(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn non_auth_failure_is_not_retried() {
        let clock = FakeClock::at(0);
        let exchange = FakeExchange::scripted(vec![FakeExchange::grant("tok", 3600)]);
        let transport = FakeTransport::scripted(vec![UpstreamResponse {
            status: 500,
            body: "upstream broke".to_string(),
        }]);
        let client = client_with(&transport, &exchange, &clock);

        let err = client.query("games", "fields id;").await.unwrap_err();
        assert!(matches!(err, CatalogError::Upstream { status: 500, .. }));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn game_name_reads_first_match() {
        let clock = FakeClock::at(0);
        let exchange = FakeExchange::scripted(vec![FakeExchange::grant("tok", 3600)]);
        let transport = FakeTransport::scripted(vec![
            FakeTransport::ok("[{\"id\": 7, \"name\": \"Hollow Knight\"}]"),
            FakeTransport::ok("[]"),
        ]);
        let client = client_with(&transport, &exchange, &clock);

        assert_eq!(client.game_name(7).await.unwrap().as_deref(), Some("Hollow Knight"));
        assert_eq!(client.game_name(999).await.unwrap(), None);
    }
}
