//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Delivery loss ("dropped events") is deliberately *not* an error: it is a
//! counter on the event bus, surfaced through `/health` only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4010,
///     "message": "unauthorized",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code (see code table on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                |
/// |-----------|---------------------|----------------------------|
/// | 1000–1999 | Protocol/Validation | 400 Bad Request            |
/// | 2000–2999 | State/Not Found     | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server/Startup      | 500 Internal Server Error  |
/// | 4010      | Authentication      | 401 Unauthorized           |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or mismatching access key. Deliberately carries no detail:
    /// an unauthenticated caller only ever sees "unauthorized".
    #[error("unauthorized")]
    Unauthorized,

    /// Signaling referenced a session or peer connection that is closed
    /// or was never registered. The peers must re-negotiate from a fresh
    /// offer; the broker never retries on their behalf.
    #[error("stale session: {0}")]
    StaleSession(Uuid),

    /// A listener bind or advertiser registration failed at boot.
    /// Fatal to `Lifecycle::start`; never retried automatically.
    #[error("startup failed: {0}")]
    StartupFailed(String),

    /// Protocol-level decode failure on a single connection.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// No connection with the given id is registered.
    #[error("connection not found: {0}")]
    ConnectionNotFound(Uuid),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedMessage(_) => 1001,
            Self::InvalidRequest(_) => 1002,
            Self::ConnectionNotFound(_) => 2001,
            Self::StaleSession(_) => 2002,
            Self::Internal(_) => 3000,
            Self::StartupFailed(_) => 3001,
            Self::Unauthorized => 4010,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedMessage(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::StaleSession(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::StartupFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
