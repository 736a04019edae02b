use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Pipeline-stage failures surfaced to callers as typed outcomes.
///
/// Per-item failures (one document, one chunk) are absorbed and logged
/// where they happen and never reach this enum.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The vector collection required at startup is absent or empty.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Non-success status or transport error from the generation endpoint.
    #[error("generation failed: {0}")]
    Generation(String),
    /// Rebuild did not complete; the previous collection is untouched.
    #[error("rebuild failed: {0}")]
    Rebuild(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Generation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Configuration(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Generation(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Rebuild(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
