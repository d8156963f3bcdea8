//! Replica Storage Module
//!
//! Read/write access to N interchangeable replicas. Stores carry no
//! coordination logic: callers must hold a read grant or write guard
//! from the [`Coordinator`](crate::coordinator::Coordinator) first.

mod file;
mod memory;

pub use file::FileReplicaStore;
pub use memory::MemoryReplicaStore;

use async_trait::async_trait;

use crate::coordinator::ReplicaId;
use crate::error::Result;

/// Blob store over a fixed set of replicas
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Number of replicas in the store
    fn replica_count(&self) -> usize;

    /// Human-readable location of a replica (used in event lines)
    fn location(&self, replica: ReplicaId) -> String;

    /// Read the full content of a replica
    async fn read(&self, replica: ReplicaId) -> Result<String>;

    /// Overwrite the content of a replica
    async fn write(&self, replica: ReplicaId, content: &str) -> Result<()>;
}

/// Initial content written to a fresh replica
pub fn initial_content(replica: ReplicaId) -> String {
    format!("Initial content in replica {}", replica)
}
