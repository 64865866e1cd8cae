//! Forwarding to the downstream tile server.
//!
//! The downstream application (a TiTiler-style raster tile server) runs as a
//! separate HTTP service. Requests leave the pipeline already rewritten and
//! are replayed against `DOWNSTREAM_URL` with the same method, path, query,
//! headers and body. The response body is streamed back.
//!
//! `accept-encoding` is not forwarded so TileJSON bodies always arrive
//! uncompressed for the response rewriter; compression towards the client is
//! handled by the outer router.

use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use crate::error::ProxyError;
use crate::rewrite::ResolvedResource;

/// Maximum request body the proxy buffers before forwarding.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Hop-by-hop headers that never cross the proxy.
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards requests to the downstream tile server.
#[derive(Clone)]
pub struct DownstreamProxy {
    client: reqwest::Client,
    base_url: Url,
}

impl DownstreamProxy {
    /// Create a proxy for `base_url`.
    ///
    /// `timeout` bounds each downstream exchange; `None` leaves timeouts to
    /// the infrastructure in front of the gateway.
    pub fn new(base_url: Url, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Target URL for a request path and query.
    pub fn target_url(&self, path_and_query: &str) -> Result<Url, ProxyError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path_and_query))
            .map_err(|e| ProxyError::InvalidUrl(e.to_string()))
    }

    /// Wrap the proxy in a router that forwards every request.
    pub fn into_router(self) -> Router {
        Router::new().fallback(proxy_handler).with_state(self)
    }

    /// Replay a request against the downstream server.
    pub async fn forward(&self, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = self.target_url(path_and_query)?;

        if let Some(resolved) = parts.extensions.get::<ResolvedResource>() {
            debug!(
                identifier = %resolved.identifier,
                location = %resolved.location,
                %target,
                "forwarding resolved resource"
            );
        } else {
            debug!(%target, "forwarding request");
        }

        let body: Bytes = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
            .await
            .map_err(|e| ProxyError::Body(e.to_string()))?;

        let response = self
            .client
            .request(parts.method, target)
            .headers(forward_headers(&parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout
                } else {
                    warn!(error = %e, "downstream request failed");
                    ProxyError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut proxied = Response::new(Body::from_stream(response.bytes_stream()));
        *proxied.status_mut() = status;
        *proxied.headers_mut() = headers;
        Ok(proxied)
    }
}

/// Request headers for the downstream server.
///
/// `Host` is kept as set by the host rewriter and mirrored into
/// `x-forwarded-host`.
fn forward_headers(original: &HeaderMap) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::ACCEPT_ENCODING);
    headers.remove(header::CONTENT_LENGTH);

    if let Some(host) = original.get(header::HOST).cloned() {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host);
    }
    headers
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named_by_connection: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(named_by_connection.iter()) {
        headers.remove(name);
    }
    headers.remove(HeaderName::from_static("keep-alive"));
}

async fn proxy_handler(State(proxy): State<DownstreamProxy>, request: Request) -> Response {
    match proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
