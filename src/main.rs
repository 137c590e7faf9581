//! # Case Registry Server Main Driver
//!
//! ## Purpose
//! Main entry point for the case registry server. Orchestrates component
//! initialization and starts the web server that fronts the case identity
//! engine.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files, command line arguments, environment variables
//! - **Output**: Running web server with case management API endpoints
//! - **Initialization**: Opens storage, verifies health, optional duplicate scan
//!
//! ## Key Features
//! - Graceful startup and shutdown
//! - Component health monitoring
//! - Configuration validation
//! - Optional duplicate scan at startup
//! - Signal handling for clean shutdown
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Open the document store and verify its health
//! 4. Wire the snapshot cache and the registry engine
//! 5. Optionally scan for duplicates
//! 6. Start web API server and wait for shutdown signals

use clap::{Arg, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use case_registry::{
    api::ApiServer,
    cache::SnapshotCache,
    config::Config,
    errors::{RegistryError, Result},
    registry::CaseRegistry,
    storage::{DocumentStore, SledDocumentStore},
    utils::SystemUtils,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("case-registry-server")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Legal Systems Team")
        .about("Case identity and renumbering engine for legal practice management")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("check-health")
                .long("check-health")
                .help("Run health checks and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan-duplicates")
                .long("scan-duplicates")
                .help("Scan for duplicates on startup regardless of configuration")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Load configuration
    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = Config::from_file(config_path)?;

    // Override port if specified
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    let config = Arc::new(config);

    // Initialize logging
    init_logging(&config)?;

    info!("Starting Case Registry v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", config_path);

    // Initialize application components
    let app_state = initialize_components(config.clone()).await?;

    // Initialization already health-checked every component
    if matches.get_flag("check-health") {
        info!("All health checks passed!");
        return Ok(());
    }

    // Startup duplicate scan
    if matches.get_flag("scan-duplicates") || config.dedup.scan_on_startup {
        scan_duplicates(&app_state).await?;
    }

    // Start the API server
    let server = ApiServer::new(app_state.clone()).await?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    info!(
        "Case Registry started successfully on {}:{}",
        config.server.host, config.server.port
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = server_handle => {
            warn!("Server stopped unexpectedly");
        }
    }

    // Graceful shutdown
    shutdown_components(&app_state).await?;
    info!("Case Registry shut down successfully");

    Ok(())
}

/// Initialize logging and tracing
fn init_logging(config: &Config) -> Result<()> {
    let log_level: tracing::Level =
        config.logging.level.parse().map_err(|_| RegistryError::Config {
            message: format!("Invalid log level: {}", config.logging.level),
        })?;

    // RUST_LOG still wins over the configured default
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
            .init();
    }

    info!("Logging initialized with level: {}", config.logging.level);
    Ok(())
}

/// Initialize all application components
async fn initialize_components(config: Arc<Config>) -> Result<AppState> {
    info!("Initializing application components...");

    info!("Opening document store...");
    let storage = Arc::new(SledDocumentStore::new(config.storage.clone()).await?);

    let cache = Arc::new(SnapshotCache::new(&config.cache));
    let registry = Arc::new(CaseRegistry::new(config.clone(), storage.clone(), cache));

    // Verify the store before serving traffic
    registry.health_check().await?;
    info!("✓ Document store is healthy");

    let stats = storage.stats().await?;
    info!(
        "✓ {} documents across {} collections ({})",
        stats.total_documents,
        stats.collections,
        SystemUtils::format_bytes(stats.database_size_bytes)
    );

    let app_state = AppState {
        config,
        registry,
        storage,
    };

    info!("All components initialized successfully");
    Ok(app_state)
}

/// Startup duplicate scan. Read-only; the results are logged so operators
/// know whether a cleanup run is due.
async fn scan_duplicates(app_state: &AppState) -> Result<()> {
    info!("Scanning for duplicate cases...");
    let report = app_state.registry.find_duplicates().await?;
    if report.is_clean() {
        info!("✓ No duplicate cases found");
    } else {
        warn!(
            "{} duplicate group(s) involving {} case(s); POST /deduplicate to merge",
            report.group_count(),
            report.stats.cases_involved
        );
    }
    Ok(())
}

/// Gracefully shutdown all components
async fn shutdown_components(app_state: &AppState) -> Result<()> {
    info!("Shutting down components...");
    app_state.storage.flush().await?;
    info!("All components shut down successfully");
    Ok(())
}
