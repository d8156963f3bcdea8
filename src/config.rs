//! ReplicaLock Configuration
//!
//! Configuration structures for the replica simulation: replica layout,
//! writer and reader workloads, coordinator tuning and logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main simulation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Replica layout
    #[serde(default)]
    pub replicas: ReplicaConfig,

    /// Writer workload
    #[serde(default)]
    pub writer: WriterConfig,

    /// Reader workload
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Coordinator tuning
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Replica layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Number of interchangeable replicas
    #[serde(default = "default_replica_count")]
    pub count: usize,

    /// Directory holding one file per replica
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Writer workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of write rounds before the writer terminates
    #[serde(default = "default_max_writes")]
    pub max_writes: u64,

    /// Minimum backoff before each write in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    /// Maximum backoff before each write in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// How long the writer holds exclusive access in milliseconds
    #[serde(default = "default_write_hold_ms")]
    pub hold_ms: u64,
}

/// Reader workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// How long new readers keep arriving, in seconds
    #[serde(default = "default_simulation_secs")]
    pub simulation_secs: u64,

    /// Minimum delay between reader arrivals in milliseconds
    #[serde(default = "default_arrival_min_ms")]
    pub arrival_min_ms: u64,

    /// Maximum delay between reader arrivals in milliseconds
    #[serde(default = "default_arrival_max_ms")]
    pub arrival_max_ms: u64,

    /// How long a reader holds its grant in milliseconds
    #[serde(default = "default_read_hold_ms")]
    pub hold_ms: u64,

    /// Upper bound on concurrently running reader tasks
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

/// Coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Seed for the replica tie-break generator (random if unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Append-only event log file (events go to tracing if unset)
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

// Default value functions
fn default_replica_count() -> usize {
    3
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./replicas")
}

fn default_max_writes() -> u64 {
    10
}

fn default_backoff_min_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    1500
}

fn default_write_hold_ms() -> u64 {
    200
}

fn default_simulation_secs() -> u64 {
    15
}

fn default_arrival_min_ms() -> u64 {
    200
}

fn default_arrival_max_ms() -> u64 {
    500
}

fn default_read_hold_ms() -> u64 {
    100
}

fn default_max_concurrent() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            count: default_replica_count(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_writes: default_max_writes(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            hold_ms: default_write_hold_ms(),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            simulation_secs: default_simulation_secs(),
            arrival_min_ms: default_arrival_min_ms(),
            arrival_max_ms: default_arrival_max_ms(),
            hold_ms: default_read_hold_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            event_log: None,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Starting point written by `init`: defaults plus a file event log
    pub fn template() -> Self {
        let mut config = Self::default();
        config.logging.event_log = Some(PathBuf::from("log.txt"));
        config
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.replicas.count == 0 {
            return Err(crate::Error::Config("replicas.count must be at least 1".into()));
        }

        if self.writer.backoff_min_ms > self.writer.backoff_max_ms {
            return Err(crate::Error::Config(
                "writer.backoff_min_ms cannot exceed writer.backoff_max_ms".into(),
            ));
        }

        if self.reader.arrival_min_ms > self.reader.arrival_max_ms {
            return Err(crate::Error::Config(
                "reader.arrival_min_ms cannot exceed reader.arrival_max_ms".into(),
            ));
        }

        if self.reader.max_concurrent == 0 {
            return Err(crate::Error::Config("reader.max_concurrent must be at least 1".into()));
        }

        if self.reader.simulation_secs == 0 {
            return Err(crate::Error::Config("reader.simulation_secs must be at least 1".into()));
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => Ok(()),
            other => Err(crate::Error::Config(format!(
                "logging.format must be 'pretty' or 'compact', got '{}'",
                other
            ))),
        }
    }

    /// Get the simulation window as Duration
    pub fn simulation_duration(&self) -> Duration {
        Duration::from_secs(self.reader.simulation_secs)
    }

    /// Get the read hold time as Duration
    pub fn read_hold(&self) -> Duration {
        Duration::from_millis(self.reader.hold_ms)
    }

    /// Get the write hold time as Duration
    pub fn write_hold(&self) -> Duration {
        Duration::from_millis(self.writer.hold_ms)
    }

    /// Get the writer backoff bounds as Durations
    pub fn writer_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.writer.backoff_min_ms),
            Duration::from_millis(self.writer.backoff_max_ms),
        )
    }

    /// Get the reader inter-arrival bounds as Durations
    pub fn reader_arrival(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reader.arrival_min_ms),
            Duration::from_millis(self.reader.arrival_max_ms),
        )
    }
}
