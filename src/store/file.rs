//! File-backed replicas
//!
//! One plain-text file per replica under a data directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{initial_content, ReplicaStore};
use crate::coordinator::ReplicaId;
use crate::error::{Error, Result};

/// Replica store keeping each replica in `replica{id}.txt`
pub struct FileReplicaStore {
    /// Replica file paths, indexed by replica id
    paths: Vec<PathBuf>,
}

impl FileReplicaStore {
    /// Create the data directory and initialize every replica file
    pub async fn create(data_dir: &Path, count: usize) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;

        let store = Self::open(data_dir, count);
        for replica in 0..count {
            store.write(replica, &initial_content(replica)).await?;
        }

        tracing::info!("Initialized {} replicas in {:?}", count, data_dir);
        Ok(store)
    }

    /// Attach to existing replica files without touching them
    pub fn open(data_dir: &Path, count: usize) -> Self {
        let paths = (0..count)
            .map(|replica| data_dir.join(format!("replica{}.txt", replica)))
            .collect();
        Self { paths }
    }

    /// Path of a replica file
    pub fn path(&self, replica: ReplicaId) -> Result<&Path> {
        self.paths
            .get(replica)
            .map(PathBuf::as_path)
            .ok_or(Error::ReplicaNotFound(replica))
    }
}

#[async_trait]
impl ReplicaStore for FileReplicaStore {
    fn replica_count(&self) -> usize {
        self.paths.len()
    }

    fn location(&self, replica: ReplicaId) -> String {
        match self.paths.get(replica) {
            Some(path) => path.display().to_string(),
            None => format!("<unknown replica {}>", replica),
        }
    }

    async fn read(&self, replica: ReplicaId) -> Result<String> {
        let path = self.path(replica)?;
        let content = tokio::fs::read_to_string(path).await?;
        Ok(content.trim().to_string())
    }

    async fn write(&self, replica: ReplicaId, content: &str) -> Result<()> {
        let path = self.path(replica)?;
        tokio::fs::write(path, format!("{}\n", content)).await?;
        Ok(())
    }
}
