use thiserror::Error;

/// Configuration errors. These are fatal and surface before the server binds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required named value was not supplied
    #[error("Missing configuration value: {name}")]
    Missing { name: &'static str },

    /// A value was supplied but cannot be used
    #[error("Invalid configuration value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors raised while mapping an identifier to a storage location.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// Identifier cannot be sharded (needs at least six characters)
    #[error("Identifier '{identifier}' is too short: sharding needs at least {min} characters")]
    IdentifierTooShort { identifier: String, min: usize },

    /// Identifier segment does not percent-decode to UTF-8
    #[error("Identifier '{identifier}' cannot be decoded: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// No bucket is configured for the requested environment
    #[error("No storage bucket configured for environment '{environment}'")]
    MissingBucket { environment: &'static str },

    /// No metadata endpoint is configured for the requested environment
    #[error("No metadata endpoint configured for environment '{environment}'")]
    MissingMetadataEndpoint { environment: &'static str },

    /// Metadata request could not be sent or completed
    #[error("Metadata lookup at {url} failed: {message}")]
    Lookup { url: String, message: String },

    /// Metadata request did not finish within the configured timeout
    #[error("Metadata lookup at {url} timed out")]
    Timeout { url: String },

    /// Metadata service answered with a non-200 status
    #[error("Metadata lookup at {url} returned HTTP {status}")]
    LookupStatus { url: String, status: u16 },

    /// Metadata document was not JSON or had no usable `uri` field
    #[error("Malformed metadata document from {url}: {message}")]
    MalformedMetadata { url: String, message: String },

    /// The resolved location could not be placed into the request URI
    #[error("Resolved location cannot be encoded into the request: {0}")]
    InvalidLocation(String),
}

/// Errors raised while rewriting a TileJSON response.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// Response body could not be buffered (read failure or too large)
    #[error("Failed to read TileJSON body: {0}")]
    Body(String),

    /// Body is not valid JSON
    #[error("TileJSON body is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// `tiles` is absent, empty, or not an array
    #[error("TileJSON document has no tiles array")]
    MissingTiles,

    /// A `tiles` entry is not a string
    #[error("TileJSON tiles entry {index} is not a string")]
    InvalidTemplate { index: usize },

    /// The first tile template carries no `url` query parameter
    #[error("Tile template has no url parameter: {template}")]
    MissingLocation { template: String },

    /// The `url` parameter has no identifier directory segment
    #[error("No identifier segment in storage location: {location}")]
    EmptyIdentifier { location: String },
}

/// Errors raised when composing the interceptor pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The same stage appears more than once
    #[error("Stage {0} appears more than once")]
    DuplicateStage(&'static str),

    /// A required stage is absent
    #[error("Stage {0} is missing")]
    MissingStage(&'static str),

    /// Stages are present but not in the required order
    #[error("Stage {stage} must come after {after}")]
    OutOfOrder {
        stage: &'static str,
        after: &'static str,
    },
}

/// Errors raised while forwarding a request to the downstream tile server.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Request body could not be buffered
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// Target URL could not be built from the request
    #[error("Invalid downstream URL: {0}")]
    InvalidUrl(String),

    /// Downstream did not answer in time
    #[error("Downstream request timed out")]
    Timeout,

    /// Downstream is unreachable or the exchange failed
    #[error("Downstream request failed: {0}")]
    Unavailable(String),
}

/// Errors from object storage (used by the `check` command).
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Location is not an `s3://bucket/key` URL
    #[error("Not an s3:// location: {0}")]
    UnsupportedLocation(String),

    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),
}
