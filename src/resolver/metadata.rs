//! Metadata-service resolution for single rasters.
//!
//! Instead of deriving the raster path, this strategy asks a metadata service
//! where the raster lives:
//!
//! ```text
//! GET {endpoint}/{identifier}
//!
//! { "uri": "s3://figgy-geo-staging/ba/na/na/banana/display_raster.tif", ... }
//! ```
//!
//! Mosaic manifests are always derived with the sharding scheme. Lookups carry
//! a bounded timeout and are never retried. Successful answers are memoised in
//! an LRU cache keyed by environment and identifier.
//!
//! Cached entries have no expiry. A raster's storage location does not change
//! once it is published, so an entry stays valid until capacity pressure
//! evicts it; restart the gateway (or run with a capacity of 0) if a location
//! is ever rewritten in place.

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::ResolutionError;

use super::{
    Environment, IdentifierResolver, PerEnvironment, ResourceKind, ShardedResolver,
    StorageLocation,
};

/// Default timeout for a single metadata request.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of memoised lookups.
pub const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 1024;

/// Largest metadata document read before the lookup is abandoned.
pub const MAX_METADATA_BYTES: usize = 1024 * 1024;

/// The part of the metadata document this gateway reads.
#[derive(Debug, Deserialize)]
struct MetadataDocument {
    uri: String,
}

type CacheKey = (Environment, String);

/// Resolver that looks single rasters up in a metadata service.
pub struct MetadataLookupResolver {
    client: reqwest::Client,
    endpoints: PerEnvironment<Url>,
    sharded: ShardedResolver,
    cache: Option<Mutex<LruCache<CacheKey, StorageLocation>>>,
    max_document_bytes: usize,
}

impl MetadataLookupResolver {
    /// Create a lookup resolver.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client; its timeout bounds every lookup
    /// * `endpoints` - Metadata base URL per environment
    /// * `sharded` - Resolver used for mosaic manifests
    /// * `cache_capacity` - Number of lookups to memoise (0 disables caching)
    pub fn new(
        client: reqwest::Client,
        endpoints: PerEnvironment<Url>,
        sharded: ShardedResolver,
        cache_capacity: usize,
    ) -> Self {
        Self {
            client,
            endpoints,
            sharded,
            cache: NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            max_document_bytes: MAX_METADATA_BYTES,
        }
    }

    /// Set the largest metadata document accepted.
    pub fn with_max_document_bytes(mut self, max_bytes: usize) -> Self {
        self.max_document_bytes = max_bytes;
        self
    }

    /// Build the HTTP client used for lookups.
    pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(timeout).build()
    }

    /// Metadata URL for an identifier: the endpoint with the identifier
    /// appended as one (percent-encoded) path segment.
    pub fn lookup_url(
        &self,
        identifier: &str,
        environment: Environment,
    ) -> Result<Url, ResolutionError> {
        let base = self.endpoints.get(environment).ok_or(
            ResolutionError::MissingMetadataEndpoint {
                environment: environment.as_str(),
            },
        )?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| ResolutionError::Lookup {
                url: base.to_string(),
                message: "endpoint cannot take path segments".to_string(),
            })?
            .pop_if_empty()
            .push(identifier);
        Ok(url)
    }

    async fn cached(&self, key: &CacheKey) -> Option<StorageLocation> {
        let cache = self.cache.as_ref()?;
        cache.lock().await.get(key).cloned()
    }

    async fn remember(&self, key: CacheKey, location: StorageLocation) {
        if let Some(cache) = &self.cache {
            cache.lock().await.put(key, location);
        }
    }

    async fn lookup(
        &self,
        identifier: &str,
        environment: Environment,
    ) -> Result<StorageLocation, ResolutionError> {
        let key = (environment, identifier.to_string());
        if let Some(location) = self.cached(&key).await {
            debug!(identifier, %location, "metadata lookup cache hit");
            return Ok(location);
        }

        let url = self.lookup_url(identifier, environment)?;
        debug!(%url, "looking up raster location");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(%url, status = status.as_u16(), "metadata lookup rejected");
            return Err(ResolutionError::LookupStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = self.read_document(&url, response).await?;
        let document: MetadataDocument =
            serde_json::from_slice(&body).map_err(|e| ResolutionError::MalformedMetadata {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let location = StorageLocation::new(document.uri);
        self.remember(key, location.clone()).await;
        Ok(location)
    }

    /// Read the response body, giving up once it passes `max_document_bytes`.
    async fn read_document(
        &self,
        url: &Url,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>, ResolutionError> {
        let too_large = || ResolutionError::MalformedMetadata {
            url: url.to_string(),
            message: format!("document exceeds {} bytes", self.max_document_bytes),
        };

        if let Some(length) = response.content_length() {
            if length > self.max_document_bytes as u64 {
                return Err(too_large());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(url, e))?
        {
            if body.len() + chunk.len() > self.max_document_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn transport_error(url: &Url, err: reqwest::Error) -> ResolutionError {
    if err.is_timeout() {
        ResolutionError::Timeout {
            url: url.to_string(),
        }
    } else {
        ResolutionError::Lookup {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl IdentifierResolver for MetadataLookupResolver {
    async fn locate(
        &self,
        identifier: &str,
        kind: ResourceKind,
        environment: Environment,
    ) -> Result<StorageLocation, ResolutionError> {
        match kind {
            ResourceKind::SingleRaster => self.lookup(identifier, environment).await,
            ResourceKind::MosaicManifest => {
                self.sharded.locate_sync(identifier, kind, environment)
            }
        }
    }
}
