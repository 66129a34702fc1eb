//! Structured errors for the ringside server.
//!
//! Every error leaves the server as JSON `{ "code": ..., "message": ... }`
//! with the status the underlying error maps to.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ringside_core::Error;
use serde::Serialize;

/// Structured errors for the ringside server.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The router or the cache failed.
    #[error(transparent)]
    Router(#[from] Error),

    /// The HTTP request itself could not be understood.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Router(e) => e.code(),
            ApiError::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Router(e) => StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorBody { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_router_error() {
        let err = ApiError::from(Error::NetworkTimeout("http://champ.example/api/fights".into()));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "NETWORK_TIMEOUT");

        let err = ApiError::from(Error::UnknownSyncTag("nope".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_input() {
        let err = ApiError::InvalidInput("bad body".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "INVALID_INPUT: bad body");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
