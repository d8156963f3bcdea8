//! ReplicaLock - Readers-Writers Simulation over Replicated Files
//!
//! Runs one writer and a stream of readers against a set of file replicas,
//! coordinated with writer priority and load-balanced reads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replicalock::config::SimulationConfig;
use replicalock::coordinator::Coordinator;
use replicalock::driver::{Driver, SimulationReport};
use replicalock::events::{EventSink, FileEventLog, TracingEventLog};
use replicalock::store::{FileReplicaStore, ReplicaStore};

/// ReplicaLock - Readers-Writers Simulation over Replicated Files
#[derive(Parser)]
#[command(name = "replicalock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "replicalock.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation
    Run {
        /// Reader arrival window in seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Number of write rounds
        #[arg(long)]
        max_writes: Option<u64>,

        /// Seed for replica tie-breaking
        #[arg(long)]
        seed: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "replicalock.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show the current content of every replica
    Inspect,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Validate = cli.command {
        return run_validate(&cli.config);
    }

    let config = load_config(&cli.config)?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, &config.logging.format);

    match cli.command {
        Commands::Run {
            duration_secs,
            max_writes,
            seed,
            json,
        } => {
            let mut config = config;
            if let Some(secs) = duration_secs {
                config.reader.simulation_secs = secs;
            }
            if let Some(writes) = max_writes {
                config.writer.max_writes = writes;
            }
            if seed.is_some() {
                config.coordinator.seed = seed;
            }
            config.validate()?;
            run_simulation(config, json).await
        }
        Commands::Init { output, force } => run_init(&output, force),
        Commands::Inspect => run_inspect(&config).await,
        Commands::Validate => Ok(()),
    }
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> anyhow::Result<SimulationConfig> {
    if path.exists() {
        SimulationConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))
    } else {
        Ok(SimulationConfig::default())
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Run the simulation against file replicas
async fn run_simulation(config: SimulationConfig, json: bool) -> anyhow::Result<()> {
    let count = config.replicas.count;
    tracing::info!("Preparing {} replicas in {:?}", count, config.replicas.data_dir);

    let store = FileReplicaStore::create(&config.replicas.data_dir, count)
        .await
        .with_context(|| format!("Failed to initialize replicas in {:?}", config.replicas.data_dir))?;

    let coordinator = match config.coordinator.seed {
        Some(seed) => Coordinator::with_seed(count, seed)?,
        None => Coordinator::new(count)?,
    };

    let events: Arc<dyn EventSink> = match &config.logging.event_log {
        Some(path) => {
            let log = FileEventLog::open(path)
                .await
                .with_context(|| format!("Failed to open event log {:?}", path))?;
            tracing::info!("Writing events to {:?}", log.path());
            Arc::new(log)
        }
        None => Arc::new(TracingEventLog),
    };

    let driver = Driver::from_config(&config, Arc::new(coordinator), Arc::new(store), events)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    let report = driver.run(cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("Simulation Report");
    println!("=================");
    println!("  Elapsed:          {} ms", report.elapsed_ms);
    println!("  Readers spawned:  {}", report.readers_spawned);
    println!("  Reads completed:  {}", report.reads_completed);
    println!("  Reads cancelled:  {}", report.reads_cancelled);
    println!("  Reads failed:     {}", report.reads_failed);
    println!("  Writes completed: {}", report.writes_completed);
    println!("  Failed writes:    {}", report.failed_replica_writes);
    println!("  Final status:     {}", report.final_status);
}

/// Write a default configuration file
fn run_init(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", output);
    }

    let content = format!(
        "# ReplicaLock Configuration\n# Generated configuration file\n\n{}",
        SimulationConfig::template().to_toml()?
    );
    std::fs::write(output, content)
        .with_context(|| format!("Failed to write {:?}", output))?;

    println!("Configuration written to {:?}", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: &Path) -> anyhow::Result<()> {
    match SimulationConfig::from_file(config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Replicas:    {} in {:?}", config.replicas.count, config.replicas.data_dir);
            println!(
                "  Writer:      {} writes, {}-{} ms backoff",
                config.writer.max_writes, config.writer.backoff_min_ms, config.writer.backoff_max_ms
            );
            println!(
                "  Readers:     {} s window, {}-{} ms arrivals, at most {} at once",
                config.reader.simulation_secs,
                config.reader.arrival_min_ms,
                config.reader.arrival_max_ms,
                config.reader.max_concurrent
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e.into())
        }
    }
}

/// Print each replica's location and content
async fn run_inspect(config: &SimulationConfig) -> anyhow::Result<()> {
    let store = FileReplicaStore::open(&config.replicas.data_dir, config.replicas.count);

    for replica in 0..store.replica_count() {
        match store.read(replica).await {
            Ok(content) => println!("Replica {} ({}): \"{}\"", replica, store.location(replica), content),
            Err(e) => println!("Replica {} ({}): unreadable: {}", replica, store.location(replica), e),
        }
    }
    Ok(())
}
