//! Router configuration for the gateway.
//!
//! # Route Structure
//!
//! ```text
//! /health                               - Health check (answered locally)
//! /{identifier}/{cog|mosaicjson}/...    - Rewritten, then forwarded
//! everything else                       - Forwarded unchanged
//! ```
//!
//! # Layers (outermost first)
//!
//! ```text
//! TraceLayer → CorsLayer → CompressionLayer → Pipeline → downstream
//! ```
//!
//! CORS preflights are answered by the CORS layer and never reach the
//! pipeline. Compression skips images and JSON.
//!
//! # Example
//!
//! ```ignore
//! use geotile_gateway::server::{create_router, DownstreamProxy, Pipeline, RouterConfig};
//!
//! let pipeline = Pipeline::standard(host, path, tilejson);
//! let proxy = DownstreamProxy::new(downstream_url, None)?;
//!
//! let router = create_router(&pipeline, proxy.into_router(), RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::compression::predicate::{DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::health_handler;
use super::pipeline::Pipeline;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the outer HTTP surface.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to compress eligible responses
    pub enable_compression: bool,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Compression is enabled
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_compression: true,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable response compression.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the gateway router.
///
/// # Arguments
///
/// * `pipeline` - The validated interceptor chain
/// * `downstream` - The service the pipeline forwards to (usually
///   [`DownstreamProxy::into_router`](super::DownstreamProxy::into_router))
/// * `config` - Router configuration
pub fn create_router(pipeline: &Pipeline, downstream: Router, config: RouterConfig) -> Router {
    let gateway = pipeline.wrap(downstream);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .fallback_service(gateway);

    if config.enable_compression {
        router = router.layer(build_compression_layer());
    }

    router = router.layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
///
/// Credentials are never allowed; the wildcard origin would reject them.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

/// Compression for everything except images and JSON.
fn build_compression_layer() -> CompressionLayer<impl Predicate> {
    let predicate =
        DefaultPredicate::new().and(NotForContentType::const_new("application/json"));
    CompressionLayer::new().compress_when(predicate)
}

// =============================================================================
// Tests
// =============================================================================
