//! Service-level error: wraps the core crates' typed errors and translates
//! them to an HTTP status only here, at the edge — library crates never
//! format a response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] identity::Error),

    #[error(transparent)]
    Pool(#[from] dbpool::Error),

    #[error(transparent)]
    Catalog(#[from] catalog::Error),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("query failed: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Identity(identity::Error::IdentityUnauthorized(_)) => StatusCode::BAD_GATEWAY,
            Error::Identity(identity::Error::IdentityTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Error::Identity(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Pool(dbpool::Error::NotInitialized) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Pool(dbpool::Error::AuthFailed(_)) => StatusCode::BAD_GATEWAY,
            Error::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            Error::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_not_found_maps_to_404() {
        let err = Error::CollectionNotFound("public.parcels".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn identity_unauthorized_maps_to_bad_gateway() {
        let err = Error::Identity(identity::Error::IdentityUnauthorized("nope".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn pool_not_initialized_maps_to_service_unavailable() {
        let err = Error::Pool(dbpool::Error::NotInitialized);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
