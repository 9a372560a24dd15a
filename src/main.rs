use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parkpulse::api::{self, AppState};
use parkpulse::cache::SnapshotStore;
use parkpulse::config::Config;
use parkpulse::registry::Registry;
use parkpulse::scheduler::AcquisitionService;

#[derive(Parser)]
#[command(
    name = "parkpulse",
    version,
    about = "Live parking occupancy pipeline with scrape, geodata and simulation sources",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML); falls back to environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop and the read API server
    Serve {
        /// Bind address override (e.g. 0.0.0.0:8642)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Run a single acquisition cycle and print the snapshot bundle
    Fetch {
        /// Pretty-print the JSON output
        #[arg(long, default_value = "false")]
        pretty: bool,
    },

    /// Show the persisted snapshot cache status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    setup_tracing(&config, cli.log_format.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(bind = ?bind, "Starting serve command");
            serve(config, bind).await?;
        }

        Commands::Fetch { pretty } => {
            tracing::info!(pretty = %pretty, "Starting fetch command");
            fetch(config, pretty).await?;
        }

        Commands::Status => {
            tracing::info!("Starting status command");
            status(config).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

fn setup_tracing(config: &Config, log_format: Option<&str>, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("parkpulse=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("parkpulse={},warn", config.logging.level))
    };

    let format = log_format.unwrap_or(&config.logging.format);
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn load_registry(config: &Config) -> Result<Registry> {
    match &config.registry.path {
        Some(path) => Registry::from_file(path),
        None => Ok(Registry::builtin()),
    }
}

async fn serve(mut config: Config, bind: Option<SocketAddr>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }

    if let Err(e) = parkpulse::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    println!("Starting ParkPulse Server");
    println!("=========================");
    println!("  Bind Address: {}", config.server.bind_addr);
    println!(
        "  Refresh Interval: {}s",
        config.acquisition.refresh_interval_secs
    );
    println!("  Stale Threshold: {}s", config.cache.stale_threshold_secs);
    println!("  Scrape URLs: {}", config.sources.scrape_urls.len());
    println!("  Geodata URLs: {}", config.sources.geodata_urls.len());
    println!();

    let registry = Arc::new(load_registry(&config)?);
    println!("Facility catalog: {} entries", registry.len());

    let store = Arc::new(SnapshotStore::with_file(
        &config.cache.snapshot_path,
        config.stale_threshold(),
    ));
    if store.load().await {
        println!(
            "Restored snapshot from {}",
            config.cache.snapshot_path.display()
        );
    }
    println!();

    let service = Arc::new(AcquisitionService::new(
        &config,
        Arc::clone(&registry),
        Arc::clone(&store),
    )?);

    // Background acquisition loop
    let loop_service = Arc::clone(&service);
    let loop_handle = tokio::spawn(async move {
        loop_service.run().await;
    });

    let state = AppState::new(Arc::clone(&service));
    let router = api::build_router(
        state,
        config.server.enable_cors,
        config.server.enable_request_logging,
    );

    println!("API Endpoints:");
    println!("  GET  /api/occupancy - Current occupancy report");
    println!("  GET  /api/health    - Health check");
    println!("  GET  /metrics       - Prometheus metrics endpoint");
    println!();
    println!("ParkPulse listening on http://{}", config.server.bind_addr);
    println!("Press Ctrl+C to stop.\n");

    api::serve(config.server.bind_addr, router, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
            }
            Err(e) => {
                tracing::error!("Failed to wait for Ctrl+C: {}", e);
            }
        }
    })
    .await?;

    service.stop().await;
    let _ = loop_handle.await;

    println!("ParkPulse stopped.");
    Ok(())
}

async fn fetch(config: Config, pretty: bool) -> Result<()> {
    let registry = Arc::new(load_registry(&config)?);
    let store = Arc::new(SnapshotStore::with_file(
        &config.cache.snapshot_path,
        config.stale_threshold(),
    ));

    // Loading the previous snapshot lets the cycle derive trends
    store.load().await;

    let service = AcquisitionService::new(&config, registry, Arc::clone(&store))?;
    let bundle = service.acquire_cycle().await;

    let output = if pretty {
        bundle.to_json_pretty()?
    } else {
        bundle.to_json()?
    };
    println!("{output}");

    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let store = SnapshotStore::with_file(&config.cache.snapshot_path, config.stale_threshold());
    store.load().await;

    let status = store.status().await;
    println!("{}", status.display());

    Ok(())
}
