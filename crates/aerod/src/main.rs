//! aerod: the AeroGrid daemon.
//!
//! Runs the purifier fan control loop against a local redb store and the
//! vendor cloud, plus a few operator commands over the same store.
//!
//! # Usage
//!
//! ```text
//! aerod --config /etc/aerogrid.toml --data-dir /var/lib/aerogrid run --interval 300
//! aerod --config /etc/aerogrid.toml once
//! aerod ingest --device monitor-1 --pm25 12.4
//! aerod history --limit 20
//! aerod purge --days 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use aero_core::{ControlConfig, epoch_secs};
use aerogrid_control::{ControlLoop, RETENTION_SECS};
use aerogrid_state::{StateStore, TelemetrySample};
use aerogrid_vendor::HttpVendorClient;
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,aerod=debug,aerogrid=debug";

#[derive(Parser)]
#[command(name = "aerod", about = "AeroGrid purifier control daemon")]
struct Cli {
    /// Path to aerogrid.toml. Without it every setting comes from defaults
    /// and AEROGRID_* environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state.
    #[arg(long, global = true, default_value = "/var/lib/aerogrid")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a control cycle on a fixed interval until Ctrl-C.
    Run {
        /// Seconds between cycles.
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Run exactly one control cycle and print its outcome.
    Once,

    /// Record one telemetry sample for a monitoring device.
    Ingest {
        #[arg(long)]
        device: String,

        #[arg(long)]
        pm1: Option<f64>,

        #[arg(long)]
        pm25: Option<f64>,

        #[arg(long)]
        pm10: Option<f64>,

        /// Sample timestamp (Unix seconds). Defaults to now.
        #[arg(long)]
        ts: Option<u64>,
    },

    /// Print the most recent control runs as JSON lines.
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Delete control runs older than the retention horizon.
    Purge {
        #[arg(long, default_value_t = RETENTION_SECS / 86_400)]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { interval } => {
            run_daemon(cli.config.as_deref(), &cli.data_dir, interval).await
        }
        Command::Once => run_once(cli.config.as_deref(), &cli.data_dir).await,
        Command::Ingest {
            device,
            pm1,
            pm25,
            pm10,
            ts,
        } => ingest(&cli.data_dir, device, pm1, pm25, pm10, ts),
        Command::History { limit } => history(&cli.data_dir, limit),
        Command::Purge { days } => purge(&cli.data_dir, days),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ControlConfig> {
    let mut config = match path {
        Some(path) => ControlConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ControlConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let db_path = data_dir.join("aerogrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

fn build_loop(
    config_path: Option<&Path>,
    data_dir: &Path,
) -> anyhow::Result<ControlLoop<HttpVendorClient>> {
    let config = load_config(config_path)?;
    let store = open_store(data_dir)?;
    let vendor = HttpVendorClient::new(&config.vendor)?;
    info!(
        enabled = config.enabled,
        dry_run = config.dry_run,
        monitor = %config.monitor_device_id,
        metric = %config.metric,
        targets = config.target_device_ids.len(),
        "control loop configured"
    );
    Ok(ControlLoop::new(store, vendor, config))
}

async fn run_daemon(config_path: Option<&Path>, data_dir: &Path, interval: u64) -> anyhow::Result<()> {
    if interval == 0 {
        bail!("--interval must be at least 1 second");
    }
    info!("AeroGrid daemon starting");
    let control = build_loop(config_path, data_dir)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Graceful shutdown on Ctrl-C.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl-C handler");
                // Keep the sender alive so the loop is not shut down.
                std::future::pending::<()>().await;
            }
        }
    });

    control.run(Duration::from_secs(interval), shutdown_rx).await;

    info!("AeroGrid daemon stopped");
    Ok(())
}

async fn run_once(config_path: Option<&Path>, data_dir: &Path) -> anyhow::Result<()> {
    let control = build_loop(config_path, data_dir)?;
    let outcome = control.run_once(epoch_secs()).await?;
    println!("{outcome}");
    Ok(())
}

fn ingest(
    data_dir: &Path,
    device: String,
    pm1: Option<f64>,
    pm25: Option<f64>,
    pm10: Option<f64>,
    ts: Option<u64>,
) -> anyhow::Result<()> {
    let device = device.trim().to_string();
    if device.is_empty() {
        bail!("--device must not be empty");
    }
    if pm1.is_none() && pm25.is_none() && pm10.is_none() {
        bail!("at least one of --pm1, --pm25, --pm10 is required");
    }
    for (name, value) in [("pm1", pm1), ("pm25", pm25), ("pm10", pm10)] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                bail!("--{name} must be a non-negative number, got {v}");
            }
        }
    }

    let store = open_store(data_dir)?;
    let sample = TelemetrySample {
        device_id: device,
        ts: ts.unwrap_or_else(epoch_secs),
        pm1_0: pm1,
        pm2_5: pm25,
        pm10,
    };
    store.put_sample(&sample)?;
    info!(device = %sample.device_id, ts = sample.ts, "sample recorded");
    Ok(())
}

fn history(data_dir: &Path, limit: usize) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    for (id, run) in store.recent_control_runs(limit)? {
        let mut line = serde_json::to_value(&run)?;
        if let Some(obj) = line.as_object_mut() {
            obj.insert("id".to_string(), id.into());
        }
        println!("{line}");
    }
    Ok(())
}

fn purge(data_dir: &Path, days: u64) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let cutoff = epoch_secs().saturating_sub(days.saturating_mul(86_400));
    let purged = store.purge_control_runs_before(cutoff)?;
    info!(purged, cutoff, "control run retention sweep complete");
    println!("purged {purged} control runs");
    Ok(())
}
