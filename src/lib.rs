//! # geotile-gateway
//!
//! An HTTP gateway in front of a raster tile server.
//!
//! Clients address datasets by a short resource identifier embedded in the
//! path (`/{identifier}/cog/...` or `/{identifier}/mosaicjson/...`). The
//! gateway expands the identifier into an object-storage URL, forwards the
//! request to the tile server with that URL in the `url` query parameter,
//! and rewrites TileJSON documents on the way back so tile links stay keyed
//! by identifier.
//!
//! ## Architecture
//!
//! - [`resolver`] - Identifier to storage location (sharded or metadata lookup)
//! - [`rewrite`] - Host, path and TileJSON rewriting middleware
//! - [`server`] - Pipeline composition, downstream proxy and router
//! - [`storage`] - S3 access for the `check` command
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use geotile_gateway::{
//!     create_router, DownstreamProxy, Environment, HostRewrite, PathRewrite, PerEnvironment,
//!     Pipeline, RouterConfig, ShardedResolver, TileJsonRewrite,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = ShardedResolver::new(PerEnvironment::new(Some("geo-staging".into()), None));
//!     let pipeline = Pipeline::standard(
//!         HostRewrite::new("tiles.example.edu")?,
//!         PathRewrite::new(Arc::new(resolver), Environment::Staging),
//!         TileJsonRewrite::default(),
//!     );
//!
//!     let proxy = DownstreamProxy::new("http://127.0.0.1:8000".parse()?, None)?;
//!     let router = create_router(&pipeline, proxy.into_router(), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod resolver;
pub mod rewrite;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use config::{
    CheckConfig, Cli, Command, ResolutionArgs, ResolveConfig, ResolverSettings, ServeConfig,
    ServeSettings,
};
pub use error::{
    ConfigError, PipelineError, ProxyError, ResolutionError, RewriteError, StorageError,
};
pub use resolver::{
    identifier_from_location, shard_key, Environment, IdentifierResolver, MetadataLookupResolver,
    PerEnvironment, ResolutionStrategy, ResourceKind, ShardedResolver, StorageLocation,
};
pub use rewrite::{
    rewrite_template, rewrite_tilejson, HostRewrite, PathRewrite, ResolvedResource,
    ResourceRoute, TileJsonRewrite,
};
pub use server::{
    create_router, health_handler, DownstreamProxy, ErrorResponse, HealthResponse, Pipeline,
    RouterConfig, Stage,
};
pub use storage::{create_s3_client, head_location, ObjectSummary};
