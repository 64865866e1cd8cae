//! Path rewriting: identifier in the path, storage location in the query.
//!
//! ```text
//! GET /123456/mosaicjson/tilejson.json?minzoom=8
//!   → GET /mosaicjson/tilejson.json?minzoom=8&url=s3%3A%2F%2Fbucket%2F12%2F34%2F56%2F123456%2Fmosaic.json
//! ```
//!
//! Requests that already carry a `url` parameter, and paths whose second
//! segment is not a resource kind, are forwarded untouched.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::uri::PathAndQuery;
use http::Uri;
use tracing::debug;

use crate::error::ResolutionError;
use crate::resolver::{Environment, IdentifierResolver, ResourceKind, StorageLocation};

use super::{has_location_param, LOCATION_PARAM};

/// A request path of the form `/{identifier}/{kind}[/...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRoute {
    /// The identifier segment as it appears in the path (still percent-encoded)
    pub identifier: String,
    pub kind: ResourceKind,

    /// The path with the identifier segment removed (`/{kind}[/...]`)
    pub downstream_path: String,
}

impl ResourceRoute {
    /// Match a path against `/{identifier}/{cog|mosaicjson}[/...]`.
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.len() <= 2 {
            return None;
        }

        let kind = ResourceKind::from_segment(segments[2])?;
        let identifier = segments.remove(1).to_string();

        Some(Self {
            identifier,
            kind,
            downstream_path: segments.join("/"),
        })
    }

    /// The identifier with percent-escapes decoded.
    ///
    /// Sharding works on characters, so escapes must be gone before the
    /// identifier is split. Escapes that do not decode to UTF-8 are rejected.
    pub fn decoded_identifier(&self) -> Result<String, ResolutionError> {
        urlencoding::decode(&self.identifier)
            .map(|decoded| decoded.into_owned())
            .map_err(|e| ResolutionError::InvalidIdentifier {
                identifier: self.identifier.clone(),
                reason: e.to_string(),
            })
    }
}

/// The resolution a rewritten request carries as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub identifier: String,
    pub kind: ResourceKind,
    pub location: StorageLocation,
}

/// Path rewriting state: the resolver and the environment it resolves for.
#[derive(Clone)]
pub struct PathRewrite {
    resolver: Arc<dyn IdentifierResolver>,
    environment: Environment,
}

impl PathRewrite {
    pub fn new(resolver: Arc<dyn IdentifierResolver>, environment: Environment) -> Self {
        Self {
            resolver,
            environment,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Compute the rewritten URI, or `None` if the request is left alone.
    pub async fn rewrite_uri(
        &self,
        uri: &Uri,
    ) -> Result<Option<(Uri, ResolvedResource)>, ResolutionError> {
        if has_location_param(uri.query()) {
            return Ok(None);
        }
        let Some(route) = ResourceRoute::parse(uri.path()) else {
            return Ok(None);
        };

        let identifier = route.decoded_identifier()?;
        let location = self
            .resolver
            .locate(&identifier, route.kind, self.environment)
            .await?;

        let rewritten = build_uri(uri, &route.downstream_path, &location)?;
        let resolved = ResolvedResource {
            identifier,
            kind: route.kind,
            location,
        };
        Ok(Some((rewritten, resolved)))
    }
}

/// Rebuild a URI with a new path and the location appended to the raw query.
///
/// Existing parameters keep their exact bytes and order.
fn build_uri(uri: &Uri, path: &str, location: &StorageLocation) -> Result<Uri, ResolutionError> {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(LOCATION_PARAM, location.as_str())
        .finish();

    let path_and_query = match uri.query() {
        Some(query) if !query.is_empty() => format!("{}?{}&{}", path, query, encoded),
        _ => format!("{}?{}", path, encoded),
    };

    let path_and_query = path_and_query
        .parse::<PathAndQuery>()
        .map_err(|e| ResolutionError::InvalidLocation(e.to_string()))?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).map_err(|e| ResolutionError::InvalidLocation(e.to_string()))
}

/// Axum middleware that expands path identifiers into storage locations.
///
/// On resolution failure the request is answered with an error and never
/// reaches the downstream server.
pub async fn path_rewrite_middleware(
    State(rewrite): State<PathRewrite>,
    mut request: Request,
    next: Next,
) -> Result<Response, ResolutionError> {
    if let Some((uri, resolved)) = rewrite.rewrite_uri(request.uri()).await? {
        debug!(
            identifier = %resolved.identifier,
            kind = %resolved.kind,
            location = %resolved.location,
            environment = %rewrite.environment,
            "rewrote resource path"
        );
        *request.uri_mut() = uri;
        request.extensions_mut().insert(resolved);
    }

    Ok(next.run(request).await)
}
