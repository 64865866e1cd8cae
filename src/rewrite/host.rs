//! Host header rewriting.
//!
//! The downstream tile server builds absolute tile URLs from the `Host` header
//! it receives. Behind a CDN or function URL that header names an internal
//! endpoint, so every request gets the public host name instead.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::header::{CONNECTION, HOST, UPGRADE};
use http::{HeaderMap, HeaderValue};

use crate::error::ConfigError;

/// Host rewriting state: the validated external host name.
#[derive(Debug, Clone)]
pub struct HostRewrite {
    host: HeaderValue,
}

impl HostRewrite {
    /// Validate the external host name.
    ///
    /// Fails at startup if the value is empty or not a legal header value.
    pub fn new(base_host: &str) -> Result<Self, ConfigError> {
        let trimmed = base_host.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Missing { name: "BASE_HOST" });
        }

        let host = HeaderValue::from_str(trimmed).map_err(|e| ConfigError::Invalid {
            name: "BASE_HOST",
            reason: e.to_string(),
        })?;

        Ok(Self { host })
    }

    pub fn host(&self) -> &HeaderValue {
        &self.host
    }

    /// Overwrite the `Host` header.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(HOST, self.host.clone());
    }
}

/// Whether a request asks to switch protocols (e.g. a WebSocket handshake).
fn is_protocol_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    connection_upgrade && headers.contains_key(UPGRADE)
}

/// Axum middleware that stamps the external host on every plain HTTP request.
///
/// Protocol upgrade requests are forwarded untouched.
pub async fn host_rewrite_middleware(
    State(rewrite): State<HostRewrite>,
    mut request: Request,
    next: Next,
) -> Response {
    if !is_protocol_upgrade(request.headers()) {
        rewrite.apply(request.headers_mut());
    }
    next.run(request).await
}
