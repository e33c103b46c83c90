//! Centralized error types for the Zapcast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::party::transport::PartyTransportError;
use crate::player::StreamError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for StreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::MediaDecode(_) => "media_decode_error",
            Self::BufferRace(_) => "buffer_race",
        }
    }
}

impl ErrorCode for PartyTransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::Rejected(_) => "party_protocol_error",
            Self::MalformedResponse(_) => "party_malformed_response",
        }
    }
}

/// Application-wide error type for the Zapcast orchestrator.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ZapcastError {
    /// Stream fetch or load failed at the network layer.
    #[error("Network error: {0}")]
    Network(String),

    /// Sink reported an unsupported format or decode failure.
    #[error("Media decode error: {0}")]
    MediaDecode(String),

    /// Playback buffer torn down mid-use (recognized by message pattern).
    ///
    /// Recovered locally with one silent reload; only escapes as an error
    /// when that reload also fails.
    #[error("Buffer race: {0}")]
    BufferRace(String),

    /// Pre-flight reachability check failed.
    ///
    /// Advisory only. Callers surface this as a notice and proceed with
    /// the load regardless.
    #[error("Stream validation failed: {0}")]
    Validation(String),

    /// Party member drifted beyond tolerance from the host position.
    ///
    /// Corrected silently by a forced seek; never surfaced to the user.
    #[error("Sync drift: {0}")]
    SyncDrift(String),

    /// Party create/join/update rejected by remote state.
    ///
    /// Always surfaced immediately; the action is aborted with no retry.
    #[error("Party error: {0}")]
    PartyProtocol(String),

    /// Requested party code does not exist (or has expired).
    #[error("Party not found: {0}")]
    PartyNotFound(String),

    /// Slot has no channel bound where one is required.
    #[error("Slot is empty: {0}")]
    SlotEmpty(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Orchestrator configuration error (bad intervals, missing URL).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ZapcastError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::MediaDecode(_) => "media_decode_error",
            Self::BufferRace(_) => "buffer_race",
            Self::Validation(_) => "validation_failed",
            Self::SyncDrift(_) => "sync_drift",
            Self::PartyProtocol(_) => "party_protocol_error",
            Self::PartyNotFound(_) => "party_not_found",
            Self::SlotEmpty(_) => "slot_empty",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PartyNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::PartyProtocol(_) | Self::SlotEmpty(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

/// Convenient Result alias for application-wide operations.
pub type ZapcastResult<T> = Result<T, ZapcastError>;

/// Result alias for single playback attempts.
pub type StreamResult<T> = Result<T, StreamError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ZapcastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StreamError> for ZapcastError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Network(msg) => Self::Network(msg),
            StreamError::MediaDecode(msg) => Self::MediaDecode(msg),
            StreamError::BufferRace(msg) => Self::BufferRace(msg),
        }
    }
}

impl From<PartyTransportError> for ZapcastError {
    fn from(err: PartyTransportError) -> Self {
        match err {
            PartyTransportError::Http(msg) => Self::Network(msg),
            PartyTransportError::Rejected(msg) => Self::PartyProtocol(msg),
            PartyTransportError::MalformedResponse(msg) => Self::PartyProtocol(msg),
        }
    }
}

impl From<reqwest::Error> for ZapcastError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_not_found_returns_correct_code() {
        let err = ZapcastError::PartyNotFound("ABC123".into());
        assert_eq!(err.code(), "party_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn domain_error_codes_are_stable() {
        assert_eq!(StreamError::Network("timeout".into()).code(), "network_error");
        assert_eq!(
            StreamError::BufferRace("buffer removed".into()).code(),
            "buffer_race"
        );
        assert_eq!(
            PartyTransportError::MalformedResponse("not json".into()).code(),
            "party_malformed_response"
        );
    }

    #[test]
    fn party_protocol_error_is_bad_request() {
        let err = ZapcastError::PartyProtocol("already joined".into());
        assert_eq!(err.code(), "party_protocol_error");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stream_error_maps_to_matching_variant() {
        let err: ZapcastError = StreamError::BufferRace("buffer removed".into()).into();
        assert_eq!(err.code(), "buffer_race");

        let err: ZapcastError = StreamError::Network("timeout".into()).into();
        assert_eq!(err.code(), "network_error");
    }

    #[test]
    fn transport_rejection_surfaces_as_party_protocol() {
        let err: ZapcastError = PartyTransportError::Rejected("Party not found".into()).into();
        assert_eq!(err.code(), "party_protocol_error");
    }
}
