//! Identifier resolution.
//!
//! Maps an opaque resource identifier to the object-storage location the
//! downstream tile server reads from.
//!
//! # Sharding Scheme
//!
//! Objects are laid out under a three-level prefix built from the first six
//! characters of the identifier:
//!
//! ```text
//! s3://{bucket}/{id[0:2]}/{id[2:4]}/{id[4:6]}/{id}/{filename}
//! ```
//!
//! where `filename` is `display_raster.tif` for single rasters and
//! `mosaic.json` for mosaic manifests.
//!
//! # Strategies
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        IdentifierResolver Trait         │
//! └────────────────────┬────────────────────┘
//!          ┌───────────┴────────────┐
//!          ▼                        ▼
//! ┌─────────────────┐    ┌──────────────────────────┐
//! │ ShardedResolver │    │  MetadataLookupResolver  │
//! │ (pure, default) │    │ (HTTP lookup for rasters)│
//! └─────────────────┘    └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use geotile_gateway::resolver::{Environment, ResourceKind, shard_key};
//!
//! let key = shard_key("123456", ResourceKind::MosaicManifest).unwrap();
//! assert_eq!(key, "12/34/56/123456/mosaic.json");
//! assert_eq!(Environment::Staging.as_str(), "staging");
//! ```

mod metadata;
mod sharded;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::error::ResolutionError;

pub use metadata::{MetadataLookupResolver, DEFAULT_LOOKUP_CACHE_CAPACITY, DEFAULT_LOOKUP_TIMEOUT};
pub use sharded::{shard_key, ShardedResolver, MIN_IDENTIFIER_LEN};

/// URL scheme of storage locations.
pub const STORAGE_SCHEME: &str = "s3";

// =============================================================================
// Resource Kind
// =============================================================================

/// What an identifier points at.
///
/// Determined by the path segment following the identifier (`cog` or
/// `mosaicjson`), which is also the downstream route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ResourceKind {
    /// A single cloud-optimized GeoTIFF
    #[value(name = "cog")]
    SingleRaster,

    /// A MosaicJSON manifest
    #[value(name = "mosaicjson")]
    MosaicManifest,
}

impl ResourceKind {
    /// Parse a kind from its path segment.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "cog" => Some(Self::SingleRaster),
            "mosaicjson" => Some(Self::MosaicManifest),
            _ => None,
        }
    }

    /// Path segment (and downstream route name) for this kind.
    pub fn segment(self) -> &'static str {
        match self {
            Self::SingleRaster => "cog",
            Self::MosaicManifest => "mosaicjson",
        }
    }

    /// Object name stored under the identifier directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::SingleRaster => "display_raster.tif",
            Self::MosaicManifest => "mosaic.json",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

// =============================================================================
// Environment
// =============================================================================

/// Deployment environment; selects the storage namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One optional value per environment (bucket names, metadata endpoints).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerEnvironment<T> {
    pub staging: Option<T>,
    pub production: Option<T>,
}

impl<T> Default for PerEnvironment<T> {
    fn default() -> Self {
        Self {
            staging: None,
            production: None,
        }
    }
}

impl<T> PerEnvironment<T> {
    pub fn new(staging: Option<T>, production: Option<T>) -> Self {
        Self {
            staging,
            production,
        }
    }

    pub fn get(&self, environment: Environment) -> Option<&T> {
        match environment {
            Environment::Staging => self.staging.as_ref(),
            Environment::Production => self.production.as_ref(),
        }
    }
}

// =============================================================================
// Storage Location
// =============================================================================

/// A fully qualified object-storage URL, e.g. `s3://bucket/12/34/56/123456/mosaic.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation(String);

impl StorageLocation {
    /// Wrap a location string as-is (e.g. one returned by the metadata service).
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Build an `s3://` location from a bucket and object key.
    pub fn from_bucket_key(bucket: &str, key: &str) -> Self {
        Self(format!("{}://{}/{}", STORAGE_SCHEME, bucket, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split an `s3://bucket/key` location into bucket and key.
    pub fn bucket_and_key(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix(STORAGE_SCHEME)?.strip_prefix("://")?;
        let (bucket, key) = rest.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some((bucket, key))
    }

    /// Identifier directory of this location (see [`identifier_from_location`]).
    pub fn identifier(&self) -> Option<&str> {
        identifier_from_location(&self.0)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageLocation {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the identifier from a storage location.
///
/// The identifier is the second-to-last `/` segment, i.e. the directory the
/// sharding scheme places the object in. Returns `None` when that segment is
/// absent or empty.
pub fn identifier_from_location(location: &str) -> Option<&str> {
    let mut segments = location.rsplit('/');
    segments.next()?;
    segments.next().filter(|segment| !segment.is_empty())
}

// =============================================================================
// Resolver Trait
// =============================================================================

/// Maps identifiers to storage locations.
///
/// The environment is an explicit argument: implementations hold only
/// immutable configuration and may be shared across concurrent requests.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn locate(
        &self,
        identifier: &str,
        kind: ResourceKind,
        environment: Environment,
    ) -> Result<StorageLocation, ResolutionError>;
}

#[async_trait]
impl<R: IdentifierResolver + ?Sized> IdentifierResolver for Arc<R> {
    async fn locate(
        &self,
        identifier: &str,
        kind: ResourceKind,
        environment: Environment,
    ) -> Result<StorageLocation, ResolutionError> {
        (**self).locate(identifier, kind, environment).await
    }
}

/// How single-raster identifiers are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResolutionStrategy {
    /// Derive the location from the sharding scheme
    #[default]
    Sharded,

    /// Ask the metadata service for the raster's `uri`
    MetadataLookup,
}
