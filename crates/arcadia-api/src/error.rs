use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use arcadia_catalog::CatalogError;

/// Handler-level failures, rendered as `{ "error": "<message>" }` JSON.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The external catalog could not serve the request (credential exchange
    /// failed, or it kept rejecting a refreshed token).
    #[error("catalog unavailable")]
    CatalogUnavailable,

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::CatalogUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            error!("Internal error: {:#}", err);
        }

        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        error!("Catalog call failed: {}", err);
        ApiError::CatalogUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_variants() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::CatalogUnavailable.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn catalog_errors_collapse_to_unavailable() {
        let err: ApiError = CatalogError::AuthenticationRejected.into();
        assert!(matches!(err, ApiError::CatalogUnavailable));

        let err: ApiError = CatalogError::CredentialExchange("no token".into()).into();
        assert!(matches!(err, ApiError::CatalogUnavailable));
    }
}
