//! Simulation Driver
//!
//! Spawns the writer and a time-boxed stream of readers against one shared
//! coordinator, then waits for every task to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SimulationConfig;
use crate::coordinator::{Coordinator, Snapshot};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::store::ReplicaStore;
use crate::worker::{jitter, pause, ReadOutcome, ReaderTask, WriterSettings, WriterSummary, WriterTask};

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Reader tasks started
    pub readers_spawned: u64,
    /// Reads that completed and released normally
    pub reads_completed: u64,
    /// Readers cancelled before or during their read
    pub reads_cancelled: u64,
    /// Readers that hit a storage error or panicked
    pub reads_failed: u64,
    /// Write rounds completed
    pub writes_completed: u64,
    /// Individual replica writes that failed
    pub failed_replica_writes: u64,
    /// Wall-clock duration of the run
    pub elapsed_ms: u64,
    /// Coordinator state after every task finished
    pub final_status: Snapshot,
}

/// Reader workload parameters
#[derive(Debug, Clone)]
pub struct ReaderWorkload {
    /// How long new readers keep arriving
    pub duration: Duration,
    /// Minimum delay between arrivals
    pub arrival_min: Duration,
    /// Maximum delay between arrivals
    pub arrival_max: Duration,
    /// Time each reader holds its grant
    pub hold: Duration,
    /// Maximum readers running at once
    pub max_concurrent: usize,
}

impl From<&SimulationConfig> for ReaderWorkload {
    fn from(config: &SimulationConfig) -> Self {
        let (arrival_min, arrival_max) = config.reader_arrival();
        Self {
            duration: config.simulation_duration(),
            arrival_min,
            arrival_max,
            hold: config.read_hold(),
            max_concurrent: config.reader.max_concurrent,
        }
    }
}

/// Drives one writer and many readers over shared replicas
pub struct Driver {
    coordinator: Arc<Coordinator>,
    store: Arc<dyn ReplicaStore>,
    events: Arc<dyn EventSink>,
    writer: WriterSettings,
    readers: ReaderWorkload,
}

impl Driver {
    /// Create a driver; the coordinator and store must agree on replica count
    pub fn new(
        coordinator: Arc<Coordinator>,
        store: Arc<dyn ReplicaStore>,
        events: Arc<dyn EventSink>,
        writer: WriterSettings,
        readers: ReaderWorkload,
    ) -> Result<Self> {
        if coordinator.replica_count() != store.replica_count() {
            return Err(Error::Config(format!(
                "coordinator manages {} replicas but the store has {}",
                coordinator.replica_count(),
                store.replica_count()
            )));
        }

        if readers.max_concurrent == 0 {
            return Err(Error::Config("reader pool needs at least one slot".into()));
        }

        Ok(Self {
            coordinator,
            store,
            events,
            writer,
            readers,
        })
    }

    /// Build a driver from configuration
    pub fn from_config(
        config: &SimulationConfig,
        coordinator: Arc<Coordinator>,
        store: Arc<dyn ReplicaStore>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Self::new(
            coordinator,
            store,
            events,
            WriterSettings::from(config),
            ReaderWorkload::from(config),
        )
    }

    /// Shared coordinator
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Run the simulation until the reader window closes and every task is done.
    ///
    /// Cancelling `cancel` stops new arrivals and aborts suspended
    /// acquisitions; the run still drains and reports.
    pub async fn run(&self, cancel: CancellationToken) -> Result<SimulationReport> {
        let started = Instant::now();
        tracing::info!(
            "Starting simulation: {} replicas, {} writes, {:?} reader window",
            self.coordinator.replica_count(),
            self.writer.max_writes,
            self.readers.duration
        );

        let writer = tokio::spawn(
            WriterTask::new(
                Arc::clone(&self.coordinator),
                Arc::clone(&self.store),
                Arc::clone(&self.events),
                self.writer.clone(),
            )
            .run(cancel.clone()),
        );

        let pool = Arc::new(Semaphore::new(self.readers.max_concurrent));
        let mut readers: JoinSet<Result<ReadOutcome>> = JoinSet::new();
        let mut readers_spawned = 0u64;

        while started.elapsed() < self.readers.duration {
            let arrival = jitter(self.readers.arrival_min, self.readers.arrival_max);
            if !pause(arrival, &cancel).await {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&pool).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            };

            let reader = ReaderTask::new(
                readers_spawned,
                Arc::clone(&self.coordinator),
                Arc::clone(&self.store),
                Arc::clone(&self.events),
                self.readers.hold,
            );
            let reader_cancel = cancel.clone();
            readers.spawn(async move {
                let outcome = reader.run(reader_cancel).await;
                drop(permit);
                outcome
            });
            readers_spawned += 1;
        }
        tracing::info!("Reader window closed after {} readers", readers_spawned);

        let writer_summary = match writer.await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                tracing::error!("Writer task failed: {}", e);
                WriterSummary::default()
            }
            Err(e) => {
                tracing::error!("Writer task panicked: {}", e);
                WriterSummary::default()
            }
        };

        let mut reads_completed = 0u64;
        let mut reads_cancelled = 0u64;
        let mut reads_failed = 0u64;
        while let Some(joined) = readers.join_next().await {
            match joined.map_err(Error::from).and_then(|outcome| outcome) {
                Ok(_) => reads_completed += 1,
                Err(Error::Cancelled) => reads_cancelled += 1,
                Err(e) => {
                    tracing::error!("Reader task failed: {}", e);
                    reads_failed += 1;
                }
            }
        }

        self.events.record(Event::SimulationFinished).await;

        let report = SimulationReport {
            readers_spawned,
            reads_completed,
            reads_cancelled,
            reads_failed,
            writes_completed: writer_summary.writes_completed,
            failed_replica_writes: writer_summary.failed_replica_writes,
            elapsed_ms: started.elapsed().as_millis() as u64,
            final_status: self.coordinator.snapshot(),
        };
        tracing::info!(
            "Simulation finished: {} reads, {} writes in {} ms",
            report.reads_completed,
            report.writes_completed,
            report.elapsed_ms
        );
        Ok(report)
    }
}
