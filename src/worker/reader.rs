//! Reader task

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::pause;
use crate::coordinator::{Coordinator, ReplicaId};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::store::ReplicaStore;

/// Result of one completed read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub reader: u64,
    pub replica: ReplicaId,
    pub content: String,
}

/// A single reader: one grant, one replica read, one release
pub struct ReaderTask {
    id: u64,
    coordinator: Arc<Coordinator>,
    store: Arc<dyn ReplicaStore>,
    events: Arc<dyn EventSink>,
    hold: Duration,
}

impl ReaderTask {
    pub fn new(
        id: u64,
        coordinator: Arc<Coordinator>,
        store: Arc<dyn ReplicaStore>,
        events: Arc<dyn EventSink>,
        hold: Duration,
    ) -> Self {
        Self {
            id,
            coordinator,
            store,
            events,
            hold,
        }
    }

    /// Run the reader to completion.
    ///
    /// The grant is a drop guard, so it is released on every exit path,
    /// including a failed read or cancellation during the hold.
    pub async fn run(self, cancel: CancellationToken) -> Result<ReadOutcome> {
        let grant = self.coordinator.acquire_read(&cancel).await?;
        let replica = grant.replica();
        let location = self.store.location(replica);

        self.events
            .record(Event::ReaderStarted {
                reader: self.id,
                replica,
                location: location.clone(),
                status: self.coordinator.snapshot(),
            })
            .await;

        let content = match self.store.read(replica).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Reader {} failed to read replica {}: {}", self.id, replica, e);
                self.events
                    .record(Event::ReaderFailed {
                        reader: self.id,
                        replica,
                        location,
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        if !pause(self.hold, &cancel).await {
            tracing::debug!("Reader {} cancelled while holding replica {}", self.id, replica);
            return Err(Error::Cancelled);
        }

        self.events
            .record(Event::ReaderFinished {
                reader: self.id,
                replica,
                location,
                content: content.clone(),
                status: self.coordinator.snapshot(),
            })
            .await;
        grant.release();

        Ok(ReadOutcome {
            reader: self.id,
            replica,
            content,
        })
    }
}
