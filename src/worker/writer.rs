//! Writer task
//!
//! Performs a bounded number of write rounds. Each round overwrites every
//! replica with the same content so replicas stay mutually consistent.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{jitter, pause};
use crate::config::SimulationConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::events::{Event, EventSink};
use crate::store::ReplicaStore;

/// Writer workload parameters
#[derive(Debug, Clone)]
pub struct WriterSettings {
    /// Write rounds before the writer terminates
    pub max_writes: u64,
    /// Minimum backoff before each round
    pub backoff_min: Duration,
    /// Maximum backoff before each round
    pub backoff_max: Duration,
    /// Time spent holding exclusive access
    pub hold: Duration,
}

impl From<&SimulationConfig> for WriterSettings {
    fn from(config: &SimulationConfig) -> Self {
        let (backoff_min, backoff_max) = config.writer_backoff();
        Self {
            max_writes: config.writer.max_writes,
            backoff_min,
            backoff_max,
            hold: config.write_hold(),
        }
    }
}

/// What the writer got done
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriterSummary {
    /// Rounds in which at least one replica write succeeded
    pub writes_completed: u64,
    /// Individual replica writes that failed (logged and skipped)
    pub failed_replica_writes: u64,
}

/// The single writer of the simulation
pub struct WriterTask {
    coordinator: Arc<Coordinator>,
    store: Arc<dyn ReplicaStore>,
    events: Arc<dyn EventSink>,
    settings: WriterSettings,
}

impl WriterTask {
    pub fn new(
        coordinator: Arc<Coordinator>,
        store: Arc<dyn ReplicaStore>,
        events: Arc<dyn EventSink>,
        settings: WriterSettings,
    ) -> Self {
        Self {
            coordinator,
            store,
            events,
            settings,
        }
    }

    /// Run every write round, stopping early on cancellation
    pub async fn run(self, cancel: CancellationToken) -> Result<WriterSummary> {
        let mut summary = WriterSummary::default();

        for round in 1..=self.settings.max_writes {
            let backoff = jitter(self.settings.backoff_min, self.settings.backoff_max);
            if !pause(backoff, &cancel).await {
                break;
            }

            let guard = match self.coordinator.acquire_write(&cancel).await {
                Ok(guard) => guard,
                Err(e) if e.is_cancelled() => break,
                Err(e) => return Err(e),
            };

            self.events
                .record(Event::WriterStarted {
                    status: self.coordinator.snapshot(),
                })
                .await;

            let content = format!("Write #{} at {}", round, chrono::Utc::now().timestamp_millis());
            let mut written = 0usize;
            for replica in 0..self.store.replica_count() {
                if let Err(e) = self.store.write(replica, &content).await {
                    tracing::warn!("Writer failed to write replica {}: {}", replica, e);
                    summary.failed_replica_writes += 1;
                    self.events
                        .record(Event::WriterFailed {
                            replica,
                            reason: e.to_string(),
                        })
                        .await;
                } else {
                    written += 1;
                }
            }
            if written > 0 {
                summary.writes_completed += 1;
            }

            let held = pause(self.settings.hold, &cancel).await;

            self.events
                .record(Event::WriterFinished {
                    content: content.clone(),
                    status: self.coordinator.snapshot(),
                })
                .await;
            guard.release();
            tracing::info!("Write round {} complete: {}", round, content);

            if !held {
                break;
            }
        }

        self.events
            .record(Event::WriterCompleted {
                writes: summary.writes_completed,
            })
            .await;
        Ok(summary)
    }
}
