//! HTTP response helpers for consistent rendezvous responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// Bare success response: `{ "success": true }`.
pub fn api_ok() -> impl IntoResponse {
    api_success(json!({ "success": true }))
}

/// Error response in the rendezvous shape: `{ "success": false, "error": msg }`.
pub fn api_error(status: StatusCode, message: impl std::fmt::Display) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.to_string()
        })),
    )
}
