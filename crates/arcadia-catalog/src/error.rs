use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog configuration missing: {0}")]
    MissingConfig(String),

    /// The identity endpoint did not return a usable token. Callers treat the
    /// catalog as unavailable; the exchange is not retried.
    #[error("credential exchange failed: {0}")]
    CredentialExchange(String),

    /// The catalog rejected a freshly exchanged token. Terminal for the request.
    #[error("catalog rejected the access token after a refresh")]
    AuthenticationRejected,

    #[error("catalog request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("catalog request could not be sent: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog response was not valid JSON: {0}")]
    Decode(String),
}
