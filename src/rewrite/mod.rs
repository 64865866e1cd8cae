//! Request and response interceptors.
//!
//! Each interceptor is an axum middleware function plus the immutable state it
//! needs. They only communicate through the request and response they pass on.
//!
//! - [`host`] - stamps the external host name onto inbound requests
//! - [`path`] - expands `/{id}/{kind}/...` into `/{kind}/...?url=<location>`
//! - [`tilejson`] - puts the identifier back into TileJSON tile templates

pub mod host;
pub mod path;
pub mod tilejson;

pub use host::{host_rewrite_middleware, HostRewrite};
pub use path::{path_rewrite_middleware, ResolvedResource, ResourceRoute, PathRewrite};
pub use tilejson::{
    rewrite_template, rewrite_tilejson, tilejson_rewrite_middleware, TileJsonRewrite,
    DEFAULT_MAX_TILEJSON_BYTES,
};

/// Query parameter carrying the storage location for the downstream server.
pub const LOCATION_PARAM: &str = "url";

/// Whether a raw query string carries a [`LOCATION_PARAM`] parameter.
pub fn has_location_param(query: Option<&str>) -> bool {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == LOCATION_PARAM))
        .unwrap_or(false)
}
