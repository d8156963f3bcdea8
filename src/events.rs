//! Event Log
//!
//! Append-only sink for the status lines emitted by readers, the writer
//! and the driver. Every sink serializes concurrent appends internally.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::coordinator::{ReplicaId, Snapshot};
use crate::error::Result;

/// Append-only sink for event lines
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one line to the log
    async fn append(&self, line: &str);

    /// Render and append an event
    async fn record(&self, event: Event) {
        self.append(&event.to_string()).await;
    }
}

/// Something worth a line in the event log
#[derive(Debug, Clone)]
pub enum Event {
    ReaderStarted {
        reader: u64,
        replica: ReplicaId,
        location: String,
        status: Snapshot,
    },
    ReaderFinished {
        reader: u64,
        replica: ReplicaId,
        location: String,
        content: String,
        status: Snapshot,
    },
    ReaderFailed {
        reader: u64,
        replica: ReplicaId,
        location: String,
        reason: String,
    },
    WriterStarted {
        status: Snapshot,
    },
    WriterFinished {
        content: String,
        status: Snapshot,
    },
    WriterFailed {
        replica: ReplicaId,
        reason: String,
    },
    WriterCompleted {
        writes: u64,
    },
    SimulationFinished,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ReaderStarted { reader, replica, location, status } => write!(
                f,
                "Reader {} started reading from Replica {} ({}) Status: {}",
                reader, replica, location, status
            ),
            Event::ReaderFinished { reader, replica, location, content, status } => write!(
                f,
                "Reader {} finished reading from Replica {} ({}) with content: \"{}\" Status: {}",
                reader, replica, location, content, status
            ),
            Event::ReaderFailed { reader, replica, location, reason } => write!(
                f,
                "Reader {} failed reading from Replica {} ({}): {}",
                reader, replica, location, reason
            ),
            Event::WriterStarted { status } => write!(f, "Writer started writing Status: {}", status),
            Event::WriterFinished { content, status } => write!(
                f,
                "Writer finished writing Status: {} with new content: \"{}\"",
                status, content
            ),
            Event::WriterFailed { replica, reason } => {
                write!(f, "Writer failed writing Replica {}: {}", replica, reason)
            }
            Event::WriterCompleted { writes } => write!(
                f,
                "Writer completed {} writes. Terminating writer task.",
                writes
            ),
            Event::SimulationFinished => write!(f, "Simulation finished."),
        }
    }
}

/// Event log appending timestamped lines to a file
pub struct FileEventLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileEventLog {
    /// Open (or create) the log file in append mode
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSink for FileEventLog {
    async fn append(&self, line: &str) {
        let stamped = format!("{} {}\n", chrono::Utc::now().to_rfc3339(), line);

        let mut file = self.file.lock().await;
        let result = async {
            file.write_all(stamped.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to append to event log {:?}: {}", self.path, e);
        }
    }
}

/// Event log forwarding lines to `tracing`
#[derive(Debug, Default)]
pub struct TracingEventLog;

#[async_trait]
impl EventSink for TracingEventLog {
    async fn append(&self, line: &str) {
        tracing::info!(target: "replicalock::events", "{}", line);
    }
}

/// Event log kept in memory
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line appended so far
    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventLog {
    async fn append(&self, line: &str) {
        self.lines.lock().await.push(line.to_string());
    }
}
