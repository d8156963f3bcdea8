//! ReplicaLock - Writer-Priority Readers-Writers Coordination over Replicas
//!
//! Coordinates concurrent readers and writers over a set of interchangeable,
//! fully replicated data stores.
//!
//! # Architecture
//!
//! A single [`Coordinator`] decides when each participant may proceed and
//! which replica a reader should use. Writers take exclusive access to every
//! replica at once and overwrite all of them, so replicas stay identical.
//! Readers share access and are spread across replicas by load.
//!
//! # Features
//!
//! - Writer priority: no reader is admitted while a writer is active or queued
//! - Least-loaded replica selection with uniform random tie-breaking
//! - Cancellable acquisition and drop-guard release
//! - File-backed and in-memory replica stores
//! - Append-only event log of reader and writer activity
//! - Simulation driver with a bounded reader pool

pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod events;
pub mod store;
pub mod worker;

pub use config::SimulationConfig;
pub use coordinator::Coordinator;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SimulationConfig;
    pub use crate::coordinator::{Coordinator, ReadGrant, ReplicaId, Snapshot, WriteGuard};
    pub use crate::driver::{Driver, SimulationReport};
    pub use crate::error::{Error, Result};
    pub use crate::events::{Event, EventSink};
    pub use crate::store::ReplicaStore;
}
