//! Error types for the facilitator HTTP service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors a facilitator route handler can return.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    /// JSON deserialization of the request body failed.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    /// The request named an `x402Version` this service does not speak.
    #[error("unsupported x402Version: {0}")]
    UnsupportedVersion(u8),
}

impl IntoResponse for FacilitatorError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
    }
}
