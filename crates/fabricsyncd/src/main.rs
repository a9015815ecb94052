//! fabricsyncd - overlay fabric synchronization daemon
//!
//! Operator entry points: validate the configuration, reconcile the
//! allocation pools with it, and report pool usage.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fabricsyncd::{FabricSyncConfig, Stores, DEFAULT_CONFIG_PATH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Overlay fabric synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "fabricsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate the configuration
    CheckConfig,
    /// Reconcile every pool with the configured ranges, then print usage
    Sync,
    /// Print pool usage as JSON
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config = FabricSyncConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::CheckConfig => {
            let ranges = config.validate().context("validating configuration")?;
            info!(
                "Configuration OK: {} L2 segments, {} L3 segments, {} leaf switches, {} border switches",
                ranges.l2_segment.len(),
                ranges.l3_segment.len(),
                config.leaf_switches.len(),
                ranges.border_vlan.len()
            );
            if config.fabric.dry_run {
                info!("Dry run is on: no configuration will reach the fabric");
            }
        }
        Command::Sync => {
            let stores = Stores::open(&config).await.context("opening store")?;
            let summary = stores.sync_all().await.context("syncing pools")?;
            let stats = stores.stats().await.context("reading pool stats")?;
            let report = serde_json::json!({ "synced": summary, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&report)?);
            stores.db.close().await;
        }
        Command::Stats => {
            let stores = Stores::open(&config).await.context("opening store")?;
            let stats = stores.stats().await.context("reading pool stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            stores.db.close().await;
        }
    }
    Ok(())
}
