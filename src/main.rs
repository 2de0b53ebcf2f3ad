//! tiledepot - An offline-first map tile cache and package installer.
//!
//! This binary wires the tile cache, admin worker and HTTP server together,
//! and drives the package installer from the command line.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiledepot::{
    admin::{AdminWorker, DEFAULT_ADMIN_QUEUE},
    archive::{clear_installed, installed_usage, InstallEvent, PackageInstaller, PackageManifest},
    config::{ClearConfig, Cli, Command, InstallConfig, PackagesConfig, ServeConfig},
    io::{create_http_client, HttpUpstream, Upstream, DEFAULT_USER_AGENT},
    server::{create_router, AppState, RouterConfig},
    store::DiskStore,
    tile::{TileCache, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Packages(config) => run_packages(config).await,
        Command::Install(config) => run_install(config).await,
        Command::Clear(config) => run_clear(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let max_bytes = config.max_cache_bytes();

    info!("tiledepot v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    match config.cache_dir {
        Some(ref dir) => info!("  Cache: {} (disk)", dir.display()),
        None => warn!("  Cache: in-memory - cached tiles are lost on exit"),
    }
    info!("  Budget: {} bytes", max_bytes);
    info!("  Freshness: {} days", config.freshness_days);
    if config.admin_token.is_some() {
        info!("  Admin: token required");
    } else {
        warn!("  Admin: OPEN - anyone who can reach the server may clear the cache");
    }

    let upstream = match build_upstream(&config.user_agent) {
        Ok(upstream) => upstream,
        Err(code) => return code,
    };

    let cache = match config.cache_dir {
        Some(ref dir) => {
            let store = match DiskStore::open(dir).await {
                Ok(store) => store,
                Err(e) => {
                    error!("Failed to open cache directory {}: {}", dir.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            match TileCache::open(Arc::new(store), max_bytes).await {
                Ok(cache) => cache,
                Err(e) => {
                    error!("Failed to load cache index: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        None => TileCache::in_memory(max_bytes),
    };
    let cache = Arc::new(cache);

    let stats = cache.stats().await;
    info!(
        "  Loaded {} cached tile(s), {} bytes ({}%)",
        stats.entry_count, stats.total_bytes, stats.usage_percent
    );

    let tile_service = TileService::new(cache.clone(), upstream.clone())
        .with_freshness(chrono::Duration::days(i64::from(config.freshness_days)));

    let (admin, _admin_task) = AdminWorker::new(cache, upstream).spawn(DEFAULT_ADMIN_QUEUE);

    let state = AppState::new(Arc::new(tile_service), admin);
    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("    curl 'http://{}/fetch?url=https://tile.example.com/7/34/22.png'", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

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

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_tracing(!config.no_tracing);

    if let Some(ref token) = config.admin_token {
        router_config = router_config.with_admin_token(token.clone());
    }

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// =============================================================================
// Packages Command
// =============================================================================

async fn run_packages(config: PackagesConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let upstream = match build_upstream(DEFAULT_USER_AGENT) {
        Ok(upstream) => upstream,
        Err(code) => return code,
    };

    let manifest = match PackageManifest::load(&config.manifest, upstream.as_ref()).await {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if manifest.is_empty() {
        println!("(no packages in {})", config.manifest);
    } else {
        println!("{:<24} {:<10} {:>14}  DESCRIPTION", "NAME", "TYPE", "SIZE");
        for package in manifest.packages() {
            let size = package
                .declared_size()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<24} {:<10} {:>14}  {}",
                package.name, package.kind, size, package.description
            );
        }
        println!();
        println!("Total: {} package(s)", manifest.len());
    }

    if let Some(dest) = config.dest {
        match installed_usage(&dest) {
            Ok(usage) => println!(
                "Installed under {}: {:.2} MiB in {} file(s)",
                dest.display(),
                usage.total_mib(),
                usage.file_count
            ),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Install Command
// =============================================================================

async fn run_install(config: InstallConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let upstream = match build_upstream(&config.user_agent) {
        Ok(upstream) => upstream,
        Err(code) => return code,
    };

    let manifest = match PackageManifest::load(&config.manifest, upstream.as_ref()).await {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("Failed to load manifest: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let package = match manifest.find(&config.package) {
        Ok(package) => package.clone(),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let installer = PackageInstaller::new(upstream, &config.dest);
    let token = installer.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling install");
            token.cancel();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let result = installer.install(&package, tx).await;
    // The sender is dropped with the install, so the reporter drains and exits
    let _ = reporter.await;

    match result {
        Ok(summary) => {
            info!(
                "Installed {} into {} ({} files, {} bytes)",
                package.name,
                config.dest.display(),
                summary.extracted_files,
                summary.extracted_bytes
            );
            match installed_usage(&config.dest) {
                Ok(usage) => info!(
                    "{} now holds {:.2} MiB in {} file(s)",
                    config.dest.display(),
                    usage.total_mib(),
                    usage.file_count
                ),
                Err(e) => warn!("Could not measure {}: {}", config.dest.display(), e),
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!("{}", failure);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Clear Command
// =============================================================================

fn run_clear(config: ClearConfig) -> ExitCode {
    init_logging(config.verbose);

    match clear_installed(&config.dest) {
        Ok(usage) => {
            info!(
                "Removed {} file(s), {:.2} MiB from {}",
                usage.file_count,
                usage.total_mib(),
                config.dest.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to clear {}: {}", config.dest.display(), e);
            ExitCode::FAILURE
        }
    }
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<InstallEvent>) {
    let mut last_percent = None;

    while let Some(event) = rx.recv().await {
        match event {
            InstallEvent::Started {
                package,
                declared_size,
            } => match declared_size {
                Some(size) => info!("Downloading {} ({} bytes)", package, size),
                None => info!("Downloading {} (size unknown)", package),
            },
            InstallEvent::Progress(progress) => match progress.percent {
                // One line per whole percent
                Some(percent) if last_percent != Some(percent) => {
                    last_percent = Some(percent);
                    info!("  {}: {}%", progress.package, percent);
                }
                Some(_) => {}
                None => info!("  {}: {} bytes", progress.package, progress.bytes_read),
            },
            InstallEvent::Completed { package, summary } => {
                info!(
                    "  {}: extracted {} file(s), {} director(ies)",
                    package, summary.extracted_files, summary.directories
                );
            }
            InstallEvent::Failed {
                package,
                extracted_files,
                error,
            } => {
                warn!(
                    "  {}: failed after {} file(s): {}",
                    package, extracted_files, error
                );
            }
        }
    }
}

// =============================================================================
// Shared Setup
// =============================================================================

fn build_upstream(user_agent: &str) -> Result<Arc<dyn Upstream>, ExitCode> {
    match create_http_client(user_agent) {
        Ok(client) => Ok(Arc::new(HttpUpstream::new(client))),
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiledepot=debug,tower_http=debug"
    } else {
        "tiledepot=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
