//! geotile-gateway - identifier-addressed front door for a raster tile server.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geotile_gateway::{
    config::{CheckConfig, Cli, Command, ResolveConfig, ServeConfig},
    create_s3_client,
    error::StorageError,
    head_location,
    resolver::{IdentifierResolver, ResolutionStrategy},
    rewrite::{PathRewrite, TileJsonRewrite},
    server::{create_router, DownstreamProxy, Pipeline, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Resolve(config) => run_resolve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let resolver_settings = &settings.resolver;

    info!("geotile-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Environment: {}", resolver_settings.environment);
    if let Some(bucket) = resolver_settings.bucket() {
        info!("  Bucket: {}", bucket);
    }
    info!("  Base host: {:?}", settings.host_rewrite.host());
    info!("  Downstream: {}", settings.downstream_url);
    match resolver_settings.strategy {
        ResolutionStrategy::Sharded => info!("  Resolution: sharded"),
        ResolutionStrategy::MetadataLookup => {
            info!("  Resolution: metadata lookup");
            if let Some(url) = resolver_settings
                .metadata_urls
                .get(resolver_settings.environment)
            {
                info!("  Metadata endpoint: {}", url);
            }
            info!(
                "  Lookup timeout: {}ms, cache: {} entries",
                resolver_settings.lookup_timeout.as_millis(),
                resolver_settings.lookup_cache_capacity
            );
        }
    }
    match settings.downstream_timeout {
        Some(timeout) => info!("  Downstream timeout: {}s", timeout.as_secs()),
        None => warn!("  Downstream timeout: none (left to upstream infrastructure)"),
    }

    let resolver = match resolver_settings.build_resolver() {
        Ok(resolver) => resolver,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let proxy = match DownstreamProxy::new(
        settings.downstream_url.clone(),
        settings.downstream_timeout,
    ) {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Failed to build downstream client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::standard(
        settings.host_rewrite.clone(),
        PathRewrite::new(resolver, resolver_settings.environment),
        TileJsonRewrite::new(settings.max_tilejson_bytes),
    );
    info!(
        "  Pipeline: {}",
        pipeline
            .stages()
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let router = create_router(
        &pipeline,
        proxy.into_router(),
        build_router_config(&config),
    );

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "geotile_gateway=debug,tower_http=debug"
    } else {
        "geotile_gateway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// =============================================================================
// Resolve Command
// =============================================================================

async fn run_resolve(config: ResolveConfig) -> ExitCode {
    let settings = match config.resolution.validate() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let resolver = match settings.build_resolver() {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match resolver
        .locate(&config.identifier, config.kind, settings.environment)
        .await
    {
        Ok(location) => {
            println!("{}", location);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    // Initialize minimal logging for check command
    if config.verbose {
        init_logging(true);
    }

    println!("geotile-gateway Configuration Check");
    println!("═══════════════════════════════════");
    println!();

    let settings = match config.resolution.validate() {
        Ok(settings) => {
            println!("✓ Environment: {}", settings.environment);
            settings
        }
        Err(e) => {
            println!("✗ Configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(bucket) = settings.bucket() {
        println!("✓ Bucket: {}", bucket);
    }
    match settings.strategy {
        ResolutionStrategy::Sharded => println!("✓ Resolution: sharded"),
        ResolutionStrategy::MetadataLookup => {
            println!("✓ Resolution: metadata lookup");
            if let Some(url) = settings.metadata_urls.get(settings.environment) {
                println!("✓ Metadata endpoint: {}", url);
            }
        }
    }

    let resolver = match settings.build_resolver() {
        Ok(resolver) => resolver,
        Err(e) => {
            println!("✗ Resolver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref identifier) = config.identifier {
        println!();
        print!("Resolving '{}' ({})... ", identifier, config.kind);

        let location = match resolver
            .locate(identifier, config.kind, settings.environment)
            .await
        {
            Ok(location) => {
                println!("✓ {}", location);
                location
            }
            Err(e) => {
                println!("✗ failed");
                println!();
                println!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };

        if let Some(ref endpoint) = config.s3_endpoint {
            println!("✓ Endpoint: {}", endpoint);
        }
        println!("✓ Region: {}", config.s3_region);
        print!("Checking object... ");

        let s3_client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

        match head_location(&s3_client, &location).await {
            Ok(summary) => {
                println!("✓ found");
                if let Some(size) = summary.size {
                    let size_mb = size as f64 / (1024.0 * 1024.0);
                    println!("  Size: {:.2} MB", size_mb);
                }
                if let Some(content_type) = summary.content_type {
                    println!("  Content-Type: {}", content_type);
                }
            }
            Err(StorageError::NotFound(_)) => {
                println!("✗ not found");
                println!();
                println!("  Nothing is stored at {}", location);
                return ExitCode::FAILURE;
            }
            Err(e) => {
                println!("✗ failed");
                println!();
                println!("Error: {}", e);
                println!();
                println!("Please check:");
                println!("  - Your AWS credentials are configured correctly");
                println!("  - The bucket exists and is accessible");
                if config.s3_endpoint.is_some() {
                    println!("  - The S3 endpoint is correct and reachable");
                }
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═══════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
