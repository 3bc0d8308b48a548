//! `sr08` command-line tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sr08_core::{
    AppEvent, CycleOutcome, MockCollector, MockTransport, Orchestrator, OrchestratorOptions,
};
use sr08_store::{SharedStore, Store};
use sr08_types::TokenPair;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "sr08")]
#[command(author, version, about = "Collection engine for SR08 smart health rings", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show stored health records, newest first
    Recent {
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run collection cycles against the built-in simulated ring
    Simulate {
        /// Number of cycles to run
        #[arg(short = 'n', long, default_value = "1")]
        cycles: u32,
    },

    /// Write a default config file and print its path
    Init,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default().context("loading default config")?,
    };

    match cli.command {
        Commands::Recent { limit } => show_recent(&config, limit),
        Commands::Simulate { cycles } => simulate(&config, cycles).await,
        Commands::Init => init_config(cli.config),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn show_recent(config: &Config, limit: usize) -> Result<()> {
    let store = Store::open(config.storage.db_path()).context("opening record database")?;
    let records = store.list_recent(limit)?;
    if records.is_empty() {
        println!("No records stored yet.");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  hr={:>3} bpm  spo2={:>3}%  steps={:>6}  battery={:>3}%  charging={}",
            record.timestamp,
            record.heart_rate,
            record.spo2,
            record.step_count,
            record.battery,
            record.charging_state.code(),
        );
    }
    Ok(())
}

async fn simulate(config: &Config, cycles: u32) -> Result<()> {
    let transport = Arc::new(MockTransport::new());
    transport.auto_measurements(true);
    let collector = Arc::new(MockCollector::new());
    let sink = Arc::new(SharedStore::new(Store::open_in_memory()?));

    let user_id = if config.collector.user_id.is_empty() {
        "simulated-user"
    } else {
        config.collector.user_id.as_str()
    };
    let options = OrchestratorOptions {
        cycle_period: Duration::from_secs(config.collection.period_minutes * 60),
        ..OrchestratorOptions::default()
    };
    let orchestrator = Arc::new(Orchestrator::with_options(
        transport,
        collector,
        sink,
        user_id,
        TokenPair {
            access_token: "simulated-access".to_string(),
            refresh_token: "simulated-refresh".to_string(),
        },
        options,
    ));
    orchestrator.start();

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AppEvent::Metric { name, value } => println!("  {name} = {value}"),
                AppEvent::Connection { state } => println!("  link: {state:?}"),
                AppEvent::BatteryLow => println!("  low battery warning"),
                AppEvent::HealthLogEntry { entry } => println!("  log: {entry}"),
                _ => {}
            }
        }
    });

    orchestrator.connect("F0:F1:F2:F3:F4:F5").await;
    for cycle in 1..=cycles {
        println!("cycle {cycle}/{cycles}");
        match orchestrator.run_cycle().await {
            CycleOutcome::Delivered(record) => {
                println!(
                    "  delivered: hr={} spo2={} steps={} battery={}%",
                    record.heart_rate, record.spo2, record.step_count, record.battery
                );
            }
            CycleOutcome::StoredOnly { delivery, .. } => {
                println!("  stored locally only ({delivery:?})");
            }
            CycleOutcome::Skipped => println!("  skipped: a cycle was already running"),
            CycleOutcome::Aborted(reason) => println!("  aborted: {reason}"),
        }
    }

    orchestrator.shutdown();
    printer.abort();
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(config::default_config_path);
    if path.exists() {
        anyhow::bail!("config already exists at {}", path.display());
    }
    Config::default().save(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
