//! torlet daemon
//!
//! Main daemon process that manages the tor instance pool.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use torlet_core::{DaemonConfig, DefaultTorrc};
use torlet_pool::TorPool;
use torlet_runtime::{ProcessLauncherConfig, TorProcessLauncher};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// torlet daemon - pool manager for a fleet of tor proxy instances
#[derive(Parser, Debug)]
#[command(name = "torletd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of instances to create at startup
    #[arg(long)]
    instances: Option<u32>,

    /// Path to the tor binary
    #[arg(long)]
    tor_path: Option<PathBuf>,

    /// Base directory for per-instance data directories
    #[arg(long)]
    data_directory: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    info!("Starting torlet daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path).expect("Failed to load configuration"),
        None => DaemonConfig::default(),
    };
    if let Some(instances) = args.instances {
        config.pool.instances = instances;
    }
    if let Some(tor_path) = args.tor_path {
        config.tor.tor_path = tor_path;
    }
    if let Some(data_directory) = args.data_directory {
        config.pool.data_directory = data_directory;
    }

    let launcher = Arc::new(TorProcessLauncher::new(ProcessLauncherConfig::from_settings(
        &config.tor,
        config.pool.data_directory.clone(),
    )));
    let pool = TorPool::new(
        launcher,
        DefaultTorrc::Static(config.pool.default_torrc.clone()),
        config.pool.data_directory.clone(),
        config.pool.load_balance_method,
    );

    info!(instances = config.pool.instances, "Creating initial fleet");
    pool.create(config.pool.instances as usize)
        .await
        .expect("Failed to create initial instances");

    info!("Pool ready, press Ctrl-C to shut down");
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");

    info!("Shutting down pool");
    if let Err(e) = pool.exit().await {
        error!(error = %e, "Pool shutdown reported errors");
    }
}
