//! Pure identifier-to-location derivation.

use async_trait::async_trait;

use crate::error::ResolutionError;

use super::{Environment, IdentifierResolver, PerEnvironment, ResourceKind, StorageLocation};

/// Minimum identifier length (in characters) the sharding scheme accepts.
pub const MIN_IDENTIFIER_LEN: usize = 6;

/// Build the sharded object key for an identifier.
///
/// Sharding counts characters rather than bytes so that non-ASCII
/// identifiers are split on character boundaries.
pub fn shard_key(identifier: &str, kind: ResourceKind) -> Result<String, ResolutionError> {
    let boundaries: Vec<usize> = identifier
        .char_indices()
        .map(|(i, _)| i)
        .take(MIN_IDENTIFIER_LEN + 1)
        .collect();

    if boundaries.len() < MIN_IDENTIFIER_LEN {
        return Err(ResolutionError::IdentifierTooShort {
            identifier: identifier.to_string(),
            min: MIN_IDENTIFIER_LEN,
        });
    }

    // Byte offset just past the sixth character
    let end = boundaries
        .get(MIN_IDENTIFIER_LEN)
        .copied()
        .unwrap_or(identifier.len());

    Ok(format!(
        "{}/{}/{}/{}/{}",
        &identifier[boundaries[0]..boundaries[2]],
        &identifier[boundaries[2]..boundaries[4]],
        &identifier[boundaries[4]..end],
        identifier,
        kind.file_name()
    ))
}

/// Resolves every identifier with the sharding scheme. Performs no I/O.
#[derive(Debug, Clone)]
pub struct ShardedResolver {
    buckets: PerEnvironment<String>,
}

impl ShardedResolver {
    pub fn new(buckets: PerEnvironment<String>) -> Self {
        Self { buckets }
    }

    pub fn bucket(&self, environment: Environment) -> Result<&str, ResolutionError> {
        self.buckets
            .get(environment)
            .map(String::as_str)
            .ok_or(ResolutionError::MissingBucket {
                environment: environment.as_str(),
            })
    }

    /// Synchronous form of [`IdentifierResolver::locate`].
    pub fn locate_sync(
        &self,
        identifier: &str,
        kind: ResourceKind,
        environment: Environment,
    ) -> Result<StorageLocation, ResolutionError> {
        let bucket = self.bucket(environment)?;
        let key = shard_key(identifier, kind)?;
        Ok(StorageLocation::from_bucket_key(bucket, &key))
    }
}

#[async_trait]
impl IdentifierResolver for ShardedResolver {
    async fn locate(
        &self,
        identifier: &str,
        kind: ResourceKind,
        environment: Environment,
    ) -> Result<StorageLocation, ResolutionError> {
        self.locate_sync(identifier, kind, environment)
    }
}
