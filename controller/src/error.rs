use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skyshelf_daemon::{DaemonError, FailureKind};
use thiserror::Error;

/// Failures that end a refresh cycle early.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("could not enumerate remotes: {0}")]
    Enumeration(#[source] DaemonError),
}

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::Daemon(err) => match err.kind() {
                FailureKind::AuthExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
                FailureKind::UpstreamError => (StatusCode::BAD_GATEWAY, "upstream_error"),
                FailureKind::Unreachable => (StatusCode::SERVICE_UNAVAILABLE, "unreachable"),
            },
        };

        let body = Json(json!({
            "success": false,
            "code": code,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
