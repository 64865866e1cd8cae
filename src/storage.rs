//! Object storage access for the `check` command.
//!
//! The gateway itself never reads from object storage; the downstream tile
//! server does. This module only verifies that a resolved location exists.

use aws_sdk_s3::Client;

use crate::error::StorageError;
use crate::resolver::StorageLocation;

/// What a HEAD request reported about an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub size: Option<i64>,
    pub content_type: Option<String>,
}

/// Create an S3 client with optional custom endpoint.
///
/// For S3-compatible services like MinIO, pass the endpoint URL:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}

/// HEAD the object behind a storage location.
pub async fn head_location(
    client: &Client,
    location: &StorageLocation,
) -> Result<ObjectSummary, StorageError> {
    let (bucket, key) = location
        .bucket_and_key()
        .ok_or_else(|| StorageError::UnsupportedLocation(location.to_string()))?;

    let head = client
        .head_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| {
            let is_not_found = e
                .as_service_error()
                .map(|se| se.is_not_found())
                .unwrap_or(false);
            let status_is_404 = e
                .raw_response()
                .map(|r| r.status().as_u16() == 404)
                .unwrap_or(false);

            if is_not_found || status_is_404 {
                StorageError::NotFound(location.to_string())
            } else {
                StorageError::S3(e.to_string())
            }
        })?;

    Ok(ObjectSummary {
        size: head.content_length(),
        content_type: head.content_type().map(str::to_string),
    })
}
