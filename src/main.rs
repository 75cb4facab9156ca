//! Verdant binary: daemon and one-shot maintenance commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use verdant::config::{self, Config};
use verdant::health::{classify, WateringRecord};
use verdant::logging;
use verdant::push::http::HttpTransport;
use verdant::push::PushTransport;
use verdant::store::Store;
use verdant::sweep::{run_once, run_sweeper, SweepDeps};

/// Plant-care backend: health sweeps and watering notifications.
#[derive(Debug, Parser)]
#[command(name = "verdant", version, about)]
struct Cli {
    /// Path to config.toml (default: `~/.verdant/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the sweep daemon until interrupted.
    Start,

    /// Run a single sweep over all plants and exit.
    Sweep,

    /// Classify a watering record at the current time and print the status.
    Classify {
        /// Last watering instant, epoch milliseconds.
        #[arg(long)]
        last_watered: i64,

        /// Expected watering cadence in days.
        #[arg(long)]
        frequency_days: f64,

        /// The watering before the last one, epoch milliseconds.
        #[arg(long)]
        previous_last_watered: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Start => start(cli.config).await,
        Command::Sweep => sweep_once(cli.config).await,
        Command::Classify {
            last_watered,
            frequency_days,
            previous_last_watered,
        } => classify_once(last_watered, frequency_days, previous_last_watered),
    }
}

/// Resolve and load the configuration, falling back to defaults when no
/// config file exists.
fn resolve_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(p) => p,
        None => config::config_dir()?.join("config.toml"),
    };
    if path.exists() {
        config::load_config(&path)
    } else {
        warn!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

/// Run the daemon: open the store, spawn the sweeper, wait for ctrl-c.
async fn start(config_path: Option<PathBuf>) -> Result<()> {
    let logs_dir = config::config_dir()?.join("logs");
    let _logging_guard = logging::init_daemon(&logs_dir)?;

    let config = Arc::new(resolve_config(config_path)?);
    let store = Arc::new(
        Store::open(&config.database.path)
            .await
            .context("failed to open plant database")?,
    );
    let push: Arc<dyn PushTransport> = Arc::new(HttpTransport::new(config.push.endpoint.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let deps = SweepDeps {
        config: Arc::clone(&config),
        store,
        push,
    };
    let sweeper = tokio::spawn(run_sweeper(deps, shutdown_rx));

    info!("verdant started");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    shutdown_tx.send(true).ok();
    sweeper.await.context("sweeper task panicked")?;
    Ok(())
}

/// Run one sweep immediately and print the outcome.
async fn sweep_once(config_path: Option<PathBuf>) -> Result<()> {
    logging::init_cli();

    let config = Arc::new(resolve_config(config_path)?);
    let store = Arc::new(
        Store::open(&config.database.path)
            .await
            .context("failed to open plant database")?,
    );
    let push: Arc<dyn PushTransport> = Arc::new(HttpTransport::new(config.push.endpoint.clone()));

    let deps = SweepDeps {
        config,
        store,
        push,
    };
    let outcome = run_once(&deps, Utc::now()).await?;
    println!(
        "swept {} plants: {} transitions, {} notifications, {} failures",
        outcome.plants_seen, outcome.transitions, outcome.notifications_sent, outcome.failures
    );
    Ok(())
}

/// Classify a single watering record against the current wall clock.
fn classify_once(
    last_watered: i64,
    frequency_days: f64,
    previous_last_watered: Option<i64>,
) -> Result<()> {
    logging::init_cli();

    let record = WateringRecord {
        last_watered_ms: Some(last_watered),
        previous_last_watered_ms: previous_last_watered,
        watering_frequency_days: frequency_days,
    };
    let status = classify(&record, Utc::now());
    println!("{status}");
    Ok(())
}
