//! HTTP handlers and error mapping for the gateway.
//!
//! The gateway answers only one route itself:
//!
//! - `GET /health` - Health check endpoint
//!
//! Everything else is forwarded through the rewrite pipeline. This module
//! also defines how each error kind is turned into a JSON error response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{ProxyError, ResolutionError, RewriteError};

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "identifier_too_short", "bad_gateway")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
///
/// Answered by the gateway itself; the downstream server is never contacted.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Build the JSON error response and log it by severity.
///
/// - 5xx errors are logged at ERROR level
/// - 404s at DEBUG level (common and expected)
/// - other 4xx errors at WARN level
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

impl ResolutionError {
    /// HTTP status and error type identifier for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ResolutionError::IdentifierTooShort { .. } => {
                (StatusCode::BAD_REQUEST, "identifier_too_short")
            }
            ResolutionError::InvalidIdentifier { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_identifier")
            }
            ResolutionError::MissingBucket { .. }
            | ResolutionError::MissingMetadataEndpoint { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "resolver_misconfigured")
            }
            ResolutionError::LookupStatus { status: 404, .. } => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ResolutionError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "lookup_timeout"),
            ResolutionError::Lookup { .. }
            | ResolutionError::LookupStatus { .. }
            | ResolutionError::MalformedMetadata { .. }
            | ResolutionError::InvalidLocation(_) => (StatusCode::BAD_GATEWAY, "resolution_failed"),
        }
    }
}

impl IntoResponse for ResolutionError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for RewriteError {
    fn into_response(self) -> Response {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "tilejson_rewrite_failed",
            self.to_string(),
        )
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ProxyError::Body(_) => (StatusCode::BAD_REQUEST, "invalid_body"),
            ProxyError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            ProxyError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "gateway_timeout"),
            ProxyError::Unavailable(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
        };
        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
