//! TileJSON response rewriting.
//!
//! The downstream server answers `.../tilejson.json` with tile templates that
//! embed the storage location:
//!
//! ```text
//! https://tiles.example.edu/mosaicjson/tiles/WebMercatorQuad/{z}/{x}/{y}@1x?url=s3%3A%2F%2Fgeo%2F24%2F43%2F18%2F2443189116dd%2Fmosaic.json
//! ```
//!
//! Clients should see stable, identifier-keyed links instead:
//!
//! ```text
//! https://tiles.example.edu/2443189116dd/mosaicjson/tiles/WebMercatorQuad/{z}/{x}/{y}@1x
//! ```
//!
//! The identifier is taken from the first template's `url` parameter (the
//! directory segment of the sharded location) and applied to every template.
//! Templates are edited as strings so `{z}`-style placeholders survive intact.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::error::RewriteError;
use crate::resolver::identifier_from_location;

use super::LOCATION_PARAM;

/// Default limit on buffered TileJSON bodies (8 MiB).
pub const DEFAULT_MAX_TILEJSON_BYTES: usize = 8 * 1024 * 1024;

/// TileJSON rewriting state.
#[derive(Debug, Clone)]
pub struct TileJsonRewrite {
    max_body_bytes: usize,
}

impl Default for TileJsonRewrite {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TILEJSON_BYTES)
    }
}

impl TileJsonRewrite {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    /// Whether a request's response is subject to rewriting.
    pub fn applies_to(method: &Method, path: &str) -> bool {
        method == Method::GET && path.contains("tilejson")
    }

    /// Buffer a response, rewrite its TileJSON body and rebuild it.
    ///
    /// Headers other than `content-length` are kept as-is.
    pub async fn rewrite_response(&self, response: Response) -> Result<Response, RewriteError> {
        let (mut parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| RewriteError::Body(e.to_string()))?;

        let rewritten = rewrite_tilejson(&bytes)?;

        parts.headers.remove(CONTENT_LENGTH);
        Ok(Response::from_parts(parts, Body::from(Bytes::from(rewritten))))
    }
}

/// Rewrite the `tiles` array of a serialized TileJSON document.
///
/// Either every template is rewritten or an error is returned.
pub fn rewrite_tilejson(body: &[u8]) -> Result<Vec<u8>, RewriteError> {
    let mut document: Value = serde_json::from_slice(body)?;

    let tiles = document
        .get_mut("tiles")
        .and_then(Value::as_array_mut)
        .filter(|tiles| !tiles.is_empty())
        .ok_or(RewriteError::MissingTiles)?;

    let first = tiles[0]
        .as_str()
        .ok_or(RewriteError::InvalidTemplate { index: 0 })?;
    let identifier = identifier_from_template(first)?;

    let rewritten = tiles
        .iter()
        .enumerate()
        .map(|(index, tile)| {
            tile.as_str()
                .map(|template| Value::String(rewrite_template(template, &identifier)))
                .ok_or(RewriteError::InvalidTemplate { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(identifier = %identifier, count = rewritten.len(), "rewrote tile templates");
    *tiles = rewritten;

    Ok(serde_json::to_vec(&document)?)
}

/// A tile template split into origin, path and query without any decoding.
struct TemplateParts<'a> {
    /// `scheme://authority`, or empty for relative templates
    origin: &'a str,
    path: &'a str,
    query: Option<&'a str>,
}

impl<'a> TemplateParts<'a> {
    fn split(template: &'a str) -> Self {
        let (before_query, query) = match template.split_once('?') {
            Some((before, query)) => (before, Some(query)),
            None => (template, None),
        };

        let (origin, path) = match before_query.find("://") {
            Some(scheme_end) => {
                let authority_start = scheme_end + 3;
                match before_query[authority_start..].find('/') {
                    Some(offset) => before_query.split_at(authority_start + offset),
                    None => (before_query, ""),
                }
            }
            None => ("", before_query),
        };

        Self {
            origin,
            path,
            query,
        }
    }
}

/// Derive the identifier from a template's `url` query parameter.
fn identifier_from_template(template: &str) -> Result<String, RewriteError> {
    let query = TemplateParts::split(template).query.unwrap_or("");
    let location = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == LOCATION_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| RewriteError::MissingLocation {
            template: template.to_string(),
        })?;

    identifier_from_location(&location)
        .map(str::to_string)
        .ok_or(RewriteError::EmptyIdentifier { location })
}

/// Insert `identifier` as the first path segment and drop `url` parameters.
///
/// Remaining query parameters keep their exact bytes; the `?` is dropped when
/// none remain.
pub fn rewrite_template(template: &str, identifier: &str) -> String {
    let parts = TemplateParts::split(template);

    let mut rewritten = String::with_capacity(template.len() + identifier.len() + 1);
    rewritten.push_str(parts.origin);
    rewritten.push('/');
    rewritten.push_str(identifier);
    if !parts.path.is_empty() && !parts.path.starts_with('/') {
        rewritten.push('/');
    }
    rewritten.push_str(parts.path);

    let kept: Vec<&str> = parts
        .query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_location_pair(pair))
        .collect();
    if !kept.is_empty() {
        rewritten.push('?');
        rewritten.push_str(&kept.join("&"));
    }

    rewritten
}

fn is_location_pair(pair: &str) -> bool {
    url::form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(key, _)| key == LOCATION_PARAM)
        .unwrap_or(false)
}

/// Axum middleware that rewrites TileJSON responses to `GET .../tilejson...`.
///
/// Non-GET requests (including CORS preflights), other paths, and non-2xx
/// responses pass through untouched. A body that cannot be rewritten turns
/// into a 500 rather than being returned half-rewritten.
pub async fn tilejson_rewrite_middleware(
    State(rewrite): State<TileJsonRewrite>,
    request: Request,
    next: Next,
) -> Response {
    let applies = TileJsonRewrite::applies_to(request.method(), request.uri().path());
    let response = next.run(request).await;

    if !applies || !response.status().is_success() {
        return response;
    }

    match rewrite.rewrite_response(response).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
