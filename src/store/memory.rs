//! In-memory replicas

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ReplicaStore;
use crate::coordinator::ReplicaId;
use crate::error::{Error, Result};

/// Replica store holding every replica in memory
///
/// The per-slot lock only provides interior mutability; exclusion between
/// readers and writers is still the coordinator's job.
pub struct MemoryReplicaStore {
    slots: Vec<RwLock<String>>,
}

impl MemoryReplicaStore {
    /// Create `count` replicas all holding `initial`
    pub fn new(count: usize, initial: &str) -> Self {
        Self {
            slots: (0..count).map(|_| RwLock::new(initial.to_string())).collect(),
        }
    }

    fn slot(&self, replica: ReplicaId) -> Result<&RwLock<String>> {
        self.slots.get(replica).ok_or(Error::ReplicaNotFound(replica))
    }
}

#[async_trait]
impl ReplicaStore for MemoryReplicaStore {
    fn replica_count(&self) -> usize {
        self.slots.len()
    }

    fn location(&self, replica: ReplicaId) -> String {
        format!("memory:{}", replica)
    }

    async fn read(&self, replica: ReplicaId) -> Result<String> {
        Ok(self.slot(replica)?.read().await.clone())
    }

    async fn write(&self, replica: ReplicaId, content: &str) -> Result<()> {
        *self.slot(replica)?.write().await = content.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryReplicaStore::new(3, "A");
        assert_eq!(store.replica_count(), 3);
        assert_eq!(store.read(2).await.unwrap(), "A");

        store.write(2, "B").await.unwrap();
        assert_eq!(store.read(2).await.unwrap(), "B");
        assert_eq!(store.read(0).await.unwrap(), "A");

        assert!(matches!(store.read(3).await, Err(Error::ReplicaNotFound(3))));
    }
}
