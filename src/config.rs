//! Configuration management for the gateway.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables for every flag (the deployment sets these)
//! - Sensible defaults for all optional settings
//!
//! Raw arguments are checked once by `validate()`, which turns them into
//! settings types the rest of the crate consumes. Validation failures are
//! [`ConfigError`]s and are fatal at startup.
//!
//! # Environment Variables
//!
//! - `ENVIRONMENT` - `staging` or `production` (required)
//! - `BASE_HOST` - External host stamped onto every request (required for `serve`)
//! - `DOWNSTREAM_URL` - Base URL of the tile server (required for `serve`)
//! - `STORAGE_BUCKET_STAGING` - Staging bucket (required when staging)
//! - `STORAGE_BUCKET_PRODUCTION` - Production bucket (required when production)
//! - `BIND_HOST` - Server bind address (default: 0.0.0.0)
//! - `PORT` - Server port (default: 3000)
//! - `RESOLUTION_STRATEGY` - `sharded` or `metadata-lookup` (default: sharded)
//! - `METADATA_URL_STAGING` / `METADATA_URL_PRODUCTION` - Metadata service per environment
//! - `LOOKUP_TIMEOUT_MS` - Metadata lookup timeout (default: 5000)
//! - `LOOKUP_CACHE_CAPACITY` - Lookups to memoise, 0 disables (default: 1024)
//! - `DOWNSTREAM_TIMEOUT_SECS` - Downstream request timeout (default: none)
//! - `MAX_TILEJSON_BYTES` - Largest TileJSON body rewritten (default: 8 MiB)
//! - `CORS_ORIGINS` - Allowed origins, comma-separated (default: any)
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use geotile_gateway::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Serve(config) = cli.into_command() {
//!     let settings = config.validate()?;
//!     println!("Listening on {}", config.bind_address());
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::error::ConfigError;
use crate::resolver::{
    Environment, IdentifierResolver, MetadataLookupResolver, PerEnvironment, ResolutionStrategy,
    ResourceKind, ShardedResolver, DEFAULT_LOOKUP_CACHE_CAPACITY,
};
use crate::rewrite::{HostRewrite, DEFAULT_MAX_TILEJSON_BYTES};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region for the `check` command.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default metadata lookup timeout in milliseconds.
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// CLI Structure
// =============================================================================

/// geotile-gateway - Identifier-addressed front door for a raster tile server.
///
/// Expands short resource identifiers in request paths into object-storage
/// URLs, forwards requests to the tile server, and rewrites TileJSON links.
#[derive(Parser, Debug, Clone)]
#[command(name = "geotile-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the gateway
    Serve(ServeConfig),

    /// Print the storage location an identifier resolves to
    Resolve(ResolveConfig),

    /// Validate configuration and optionally check an object exists
    Check(CheckConfig),
}

// =============================================================================
// Resolution Arguments
// =============================================================================

/// Arguments shared by every command that resolves identifiers.
#[derive(Args, Debug, Clone)]
pub struct ResolutionArgs {
    /// Deployment environment; selects the bucket and metadata endpoint.
    #[arg(long, value_enum, env = "ENVIRONMENT")]
    pub environment: Option<Environment>,

    /// Storage bucket for staging.
    #[arg(long, env = "STORAGE_BUCKET_STAGING")]
    pub bucket_staging: Option<String>,

    /// Storage bucket for production.
    #[arg(long, env = "STORAGE_BUCKET_PRODUCTION")]
    pub bucket_production: Option<String>,

    /// How single-raster identifiers are resolved.
    #[arg(long = "resolution", value_enum, default_value_t = ResolutionStrategy::Sharded, env = "RESOLUTION_STRATEGY")]
    pub strategy: ResolutionStrategy,

    /// Metadata service base URL for staging (metadata-lookup only).
    #[arg(long, env = "METADATA_URL_STAGING")]
    pub metadata_url_staging: Option<String>,

    /// Metadata service base URL for production (metadata-lookup only).
    #[arg(long, env = "METADATA_URL_PRODUCTION")]
    pub metadata_url_production: Option<String>,

    /// Metadata lookup timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOOKUP_TIMEOUT_MS, env = "LOOKUP_TIMEOUT_MS")]
    pub lookup_timeout_ms: u64,

    /// Number of successful lookups to memoise (0 disables the cache).
    #[arg(long = "lookup-cache", default_value_t = DEFAULT_LOOKUP_CACHE_CAPACITY, env = "LOOKUP_CACHE_CAPACITY")]
    pub lookup_cache_capacity: usize,
}

/// Validated resolution settings.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub environment: Environment,
    pub buckets: PerEnvironment<String>,
    pub strategy: ResolutionStrategy,
    pub metadata_urls: PerEnvironment<Url>,
    pub lookup_timeout: Duration,
    pub lookup_cache_capacity: usize,
}

impl ResolutionArgs {
    /// Validate the arguments.
    ///
    /// Only the active environment needs a bucket (and, for metadata
    /// lookups, an endpoint). Empty values count as missing.
    pub fn validate(&self) -> Result<ResolverSettings, ConfigError> {
        let environment = self.environment.ok_or(ConfigError::Missing {
            name: "ENVIRONMENT",
        })?;

        let buckets = PerEnvironment::new(
            non_empty(&self.bucket_staging),
            non_empty(&self.bucket_production),
        );
        if buckets.get(environment).is_none() {
            return Err(ConfigError::Missing {
                name: bucket_variable(environment),
            });
        }

        let metadata_urls = PerEnvironment::new(
            parse_url("METADATA_URL_STAGING", &self.metadata_url_staging)?,
            parse_url("METADATA_URL_PRODUCTION", &self.metadata_url_production)?,
        );

        if self.strategy == ResolutionStrategy::MetadataLookup {
            if metadata_urls.get(environment).is_none() {
                return Err(ConfigError::Missing {
                    name: metadata_variable(environment),
                });
            }
            if self.lookup_timeout_ms == 0 {
                return Err(ConfigError::Invalid {
                    name: "LOOKUP_TIMEOUT_MS",
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(ResolverSettings {
            environment,
            buckets,
            strategy: self.strategy,
            metadata_urls,
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            lookup_cache_capacity: self.lookup_cache_capacity,
        })
    }
}

impl ResolverSettings {
    /// Bucket of the active environment.
    pub fn bucket(&self) -> Option<&str> {
        self.buckets.get(self.environment).map(String::as_str)
    }

    /// Build the resolver for the configured strategy.
    pub fn build_resolver(&self) -> Result<Arc<dyn IdentifierResolver>, ConfigError> {
        let sharded = ShardedResolver::new(self.buckets.clone());

        match self.strategy {
            ResolutionStrategy::Sharded => Ok(Arc::new(sharded)),
            ResolutionStrategy::MetadataLookup => {
                let client = MetadataLookupResolver::build_client(self.lookup_timeout).map_err(
                    |e| ConfigError::Invalid {
                        name: "LOOKUP_TIMEOUT_MS",
                        reason: e.to_string(),
                    },
                )?;
                Ok(Arc::new(MetadataLookupResolver::new(
                    client,
                    self.metadata_urls.clone(),
                    sharded,
                    self.lookup_cache_capacity,
                )))
            }
        }
    }
}

// =============================================================================
// Serve Command Configuration
// =============================================================================

/// Configuration for the serve command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "BIND_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// External host name written into every request's Host header.
    #[arg(long, env = "BASE_HOST")]
    pub base_host: Option<String>,

    // =========================================================================
    // Downstream Configuration
    // =========================================================================
    /// Base URL of the downstream tile server.
    #[arg(long, env = "DOWNSTREAM_URL")]
    pub downstream_url: Option<String>,

    /// Timeout for downstream requests in seconds (default: none).
    #[arg(long, env = "DOWNSTREAM_TIMEOUT_SECS")]
    pub downstream_timeout_secs: Option<u64>,

    /// Largest TileJSON body the response rewriter buffers.
    #[arg(long, default_value_t = DEFAULT_MAX_TILEJSON_BYTES, env = "MAX_TILEJSON_BYTES")]
    pub max_tilejson_bytes: usize,

    // =========================================================================
    // Resolution Configuration
    // =========================================================================
    #[command(flatten)]
    pub resolution: ResolutionArgs,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

/// Validated settings for the serve command.
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub resolver: ResolverSettings,
    pub host_rewrite: HostRewrite,
    pub downstream_url: Url,
    pub downstream_timeout: Option<Duration>,
    pub max_tilejson_bytes: usize,
}

impl ServeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<ServeSettings, ConfigError> {
        let host_rewrite = HostRewrite::new(self.base_host.as_deref().unwrap_or(""))?;

        let downstream_url = parse_url("DOWNSTREAM_URL", &self.downstream_url)?.ok_or(
            ConfigError::Missing {
                name: "DOWNSTREAM_URL",
            },
        )?;
        if !matches!(downstream_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "DOWNSTREAM_URL",
                reason: format!("unsupported scheme '{}'", downstream_url.scheme()),
            });
        }

        if self.max_tilejson_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_TILEJSON_BYTES",
                reason: "must be greater than 0".to_string(),
            });
        }

        let downstream_timeout = match self.downstream_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "DOWNSTREAM_TIMEOUT_SECS",
                    reason: "must be greater than 0".to_string(),
                })
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(ServeSettings {
            resolver: self.resolution.validate()?,
            host_rewrite,
            downstream_url,
            downstream_timeout,
            max_tilejson_bytes: self.max_tilejson_bytes,
        })
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Resolve Command Configuration
// =============================================================================

/// Configuration for the resolve command.
#[derive(Args, Debug, Clone)]
pub struct ResolveConfig {
    /// Resource identifier to resolve.
    pub identifier: String,

    /// Resource kind.
    #[arg(long, value_enum, default_value_t = ResourceKind::SingleRaster)]
    pub kind: ResourceKind,

    #[command(flatten)]
    pub resolution: ResolutionArgs,
}

// =============================================================================
// Check Command Configuration
// =============================================================================

/// Configuration for the check command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub resolution: ResolutionArgs,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "S3_REGION")]
    pub s3_region: String,

    /// Resolve this identifier and check the object exists.
    #[arg(long)]
    pub identifier: Option<String>,

    /// Resource kind of `--identifier`.
    #[arg(long, value_enum, default_value_t = ResourceKind::SingleRaster)]
    pub kind: ResourceKind,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Helpers
// =============================================================================

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_url(name: &'static str, value: &Option<String>) -> Result<Option<Url>, ConfigError> {
    non_empty(value)
        .map(|raw| {
            Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn bucket_variable(environment: Environment) -> &'static str {
    match environment {
        Environment::Staging => "STORAGE_BUCKET_STAGING",
        Environment::Production => "STORAGE_BUCKET_PRODUCTION",
    }
}

fn metadata_variable(environment: Environment) -> &'static str {
    match environment {
        Environment::Staging => "METADATA_URL_STAGING",
        Environment::Production => "METADATA_URL_PRODUCTION",
    }
}

// =============================================================================
// Tests
// =============================================================================
