//! Replica Coordinator
//!
//! A writer-priority readers-writers monitor over a fixed set of
//! interchangeable replicas. Readers are admitted only while no writer is
//! active or queued, and each admitted reader is pointed at the least-loaded
//! replica. Writers get exclusive access to every replica at once.
//!
//! All state lives behind one mutex. Suspended callers wait on one of two
//! notification queues (read admission, write admission) and re-check their
//! predicate after every wake-up.

mod balance;
mod snapshot;

pub use balance::least_loaded;
pub use snapshot::Snapshot;

use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Replica identifier, an index in `0..replica_count`
pub type ReplicaId = usize;

/// Mutable coordinator state, only touched under the coordinator mutex
struct CoordinatorState {
    /// Active readers per replica
    reader_counts: Vec<usize>,
    /// A writer holds exclusive access
    writer_active: bool,
    /// Writers queued for exclusive access
    waiting_writers: usize,
    /// Tie-break generator for replica selection
    rng: StdRng,
}

impl CoordinatorState {
    fn total_readers(&self) -> usize {
        self.reader_counts.iter().sum()
    }

    /// Strict writer priority: a queued writer blocks new readers
    fn admits_reader(&self) -> bool {
        !self.writer_active && self.waiting_writers == 0
    }

    fn admits_writer(&self) -> bool {
        !self.writer_active && self.total_readers() == 0
    }

    /// Admit one reader onto the least-loaded replica
    fn admit_reader(&mut self) -> Option<ReplicaId> {
        let replica = least_loaded(&self.reader_counts, &mut self.rng)?;
        self.reader_counts[replica] += 1;
        Some(replica)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            reader_counts: self.reader_counts.clone(),
            writer_active: self.writer_active,
            waiting_writers: self.waiting_writers,
        }
    }
}

/// Readers-writers coordinator with writer priority and read load balancing
pub struct Coordinator {
    /// Coordinator state
    state: Mutex<CoordinatorState>,
    /// Wakes readers waiting for admission
    read_ready: Notify,
    /// Wakes writers waiting for exclusivity
    write_ready: Notify,
}

impl Coordinator {
    /// Create a coordinator over `replicas` replicas
    pub fn new(replicas: usize) -> Result<Self> {
        Self::with_rng(replicas, StdRng::from_entropy())
    }

    /// Create a coordinator whose replica tie-breaks are reproducible
    pub fn with_seed(replicas: usize, seed: u64) -> Result<Self> {
        Self::with_rng(replicas, StdRng::seed_from_u64(seed))
    }

    fn with_rng(replicas: usize, rng: StdRng) -> Result<Self> {
        if replicas == 0 {
            return Err(Error::Config("coordinator needs at least one replica".into()));
        }

        Ok(Self {
            state: Mutex::new(CoordinatorState {
                reader_counts: vec![0; replicas],
                writer_active: false,
                waiting_writers: 0,
                rng,
            }),
            read_ready: Notify::new(),
            write_ready: Notify::new(),
        })
    }

    /// Number of replicas under coordination
    pub fn replica_count(&self) -> usize {
        self.lock_state().reader_counts.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        // Nothing panics mid-update while the lock is held
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for read admission and take a grant on the least-loaded replica.
    ///
    /// Suspends while a writer is active or queued. Returns
    /// [`Error::Cancelled`] if `cancel` fires first, in which case no replica
    /// count was touched and nothing needs releasing.
    pub async fn acquire_read(&self, cancel: &CancellationToken) -> Result<ReadGrant<'_>> {
        loop {
            // Register before checking so a release between check and wait is not lost
            let notified = self.read_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock_state();
                if state.admits_reader() {
                    let replica = state
                        .admit_reader()
                        .ok_or_else(|| Error::Internal("no replica available".into()))?;
                    tracing::debug!("Read granted on replica {}: {}", replica, state.snapshot());
                    return Ok(ReadGrant {
                        coordinator: self,
                        replica,
                    });
                }
            }

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = cancel.cancelled() => {
                    tracing::debug!("Read acquisition cancelled");
                    return Err(Error::Cancelled);
                }
            }
        }
    }

    /// Queue as a writer and wait for exclusive access to every replica.
    ///
    /// While queued, no new reader is admitted. If `cancel` fires (or the
    /// returned future is dropped) before admission, the writer leaves the
    /// queue and blocked readers are woken if nothing else holds them back.
    pub async fn acquire_write(&self, cancel: &CancellationToken) -> Result<WriteGuard<'_>> {
        self.lock_state().waiting_writers += 1;
        let mut pending = PendingWriter {
            coordinator: self,
            queued: true,
        };

        loop {
            let notified = self.write_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock_state();
                if state.admits_writer() {
                    state.waiting_writers -= 1;
                    state.writer_active = true;
                    pending.queued = false;
                    tracing::debug!("Write granted: {}", state.snapshot());
                    return Ok(WriteGuard { coordinator: self });
                }
            }

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = cancel.cancelled() => {
                    tracing::debug!("Write acquisition cancelled");
                    return Err(Error::Cancelled);
                }
            }
        }
    }

    /// Consistent view of reader counts and writer state
    pub fn snapshot(&self) -> Snapshot {
        self.lock_state().snapshot()
    }

    fn release_read(&self, replica: ReplicaId) {
        let mut state = self.lock_state();

        let held = state.reader_counts.get(replica).copied().unwrap_or(0);
        if held == 0 {
            drop(state);
            panic!("released replica {} without a matching read grant", replica);
        }
        state.reader_counts[replica] -= 1;

        let wake_writer = state.total_readers() == 0 && state.waiting_writers > 0;
        tracing::debug!("Read released on replica {}: {}", replica, state.snapshot());
        drop(state);

        if wake_writer {
            // Only one writer can proceed, so signal rather than broadcast
            self.write_ready.notify_one();
        }
    }

    fn release_write(&self) {
        let mut state = self.lock_state();
        assert!(state.writer_active, "released write access that was never granted");
        state.writer_active = false;

        let wake_writer = state.waiting_writers > 0;
        tracing::debug!("Write released: {}", state.snapshot());
        drop(state);

        // Readers re-check admission and go back to sleep if a writer is still queued
        self.read_ready.notify_waiters();
        if wake_writer {
            self.write_ready.notify_one();
        }
    }

    fn abandon_write(&self) {
        let mut state = self.lock_state();
        state.waiting_writers -= 1;

        let wake_readers = state.admits_reader();
        let wake_writer = state.waiting_writers > 0 && state.admits_writer();
        drop(state);

        if wake_readers {
            self.read_ready.notify_waiters();
        }
        if wake_writer {
            self.write_ready.notify_one();
        }
    }
}

/// Shared read access to one replica, released on drop
#[must_use = "dropping a ReadGrant releases the replica immediately"]
pub struct ReadGrant<'a> {
    coordinator: &'a Coordinator,
    replica: ReplicaId,
}

impl ReadGrant<'_> {
    /// Replica this grant authorizes reading from
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Release the grant explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ReadGrant<'_> {
    fn drop(&mut self) {
        self.coordinator.release_read(self.replica);
    }
}

/// Exclusive write access to every replica, released on drop
#[must_use = "dropping a WriteGuard releases write access immediately"]
pub struct WriteGuard<'a> {
    coordinator: &'a Coordinator,
}

impl WriteGuard<'_> {
    /// Release write access explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.release_write();
    }
}

/// Queue slot held by a writer between entering `acquire_write` and admission
struct PendingWriter<'a> {
    coordinator: &'a Coordinator,
    queued: bool,
}

impl Drop for PendingWriter<'_> {
    fn drop(&mut self) {
        if self.queued {
            self.coordinator.abandon_write();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinSet;
    use tokio::time::timeout;

    /// Yield until the coordinator reaches the expected state
    async fn wait_until<F>(coordinator: &Coordinator, predicate: F)
    where
        F: Fn(&Snapshot) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            while !predicate(&coordinator.snapshot()) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("coordinator never reached expected state");
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert!(matches!(Coordinator::new(0), Err(Error::Config(_))));
        assert_eq!(Coordinator::new(3).unwrap().replica_count(), 3);
    }

    #[test]
    #[should_panic(expected = "without a matching read grant")]
    fn test_release_without_grant_panics() {
        let coordinator = Coordinator::new(3).unwrap();
        coordinator.release_read(0);
    }

    #[test]
    #[should_panic(expected = "without a matching read grant")]
    fn test_release_of_unknown_replica_panics() {
        let coordinator = Coordinator::new(3).unwrap();
        coordinator.release_read(7);
    }

    #[tokio::test]
    async fn test_read_grant_and_release() {
        let coordinator = Coordinator::with_seed(3, 1).unwrap();
        let cancel = CancellationToken::new();

        let grant = coordinator.acquire_read(&cancel).await.unwrap();
        let replica = grant.replica();
        assert!(replica < 3);
        assert_eq!(coordinator.snapshot().reader_counts[replica], 1);
        assert_eq!(coordinator.snapshot().total_readers(), 1);

        grant.release();
        assert_eq!(coordinator.snapshot().reader_counts, vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_release_lowers_only_its_replica() {
        let coordinator = Coordinator::with_seed(3, 2).unwrap();
        let cancel = CancellationToken::new();

        let mut grants = Vec::new();
        for _ in 0..6 {
            grants.push(coordinator.acquire_read(&cancel).await.unwrap());
        }
        assert_eq!(coordinator.snapshot().reader_counts, vec![2, 2, 2]);

        while let Some(grant) = grants.pop() {
            let replica = grant.replica();
            let before = coordinator.snapshot().reader_counts;
            grant.release();
            let after = coordinator.snapshot().reader_counts;

            for id in 0..3 {
                if id == replica {
                    assert_eq!(after[id], before[id] - 1);
                } else {
                    assert_eq!(after[id], before[id]);
                }
            }
        }
        assert_eq!(coordinator.snapshot().reader_counts, vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_reads_stay_balanced() {
        let coordinator = Coordinator::new(3).unwrap();
        let cancel = CancellationToken::new();

        let mut grants = Vec::new();
        for _ in 0..31 {
            grants.push(coordinator.acquire_read(&cancel).await.unwrap());
            assert!(coordinator.snapshot().load_spread() <= 1);
        }
        assert_eq!(coordinator.snapshot().total_readers(), 31);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_stay_balanced() {
        let coordinator = Arc::new(Coordinator::new(3).unwrap());
        let barrier = Arc::new(tokio::sync::Barrier::new(25));
        let mut tasks = JoinSet::new();

        for _ in 0..24 {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            tasks.spawn(async move {
                let cancel = CancellationToken::new();
                let grant = coordinator.acquire_read(&cancel).await.unwrap();
                assert!(coordinator.snapshot().load_spread() <= 1);
                // Hold until every reader is in
                barrier.wait().await;
                barrier.wait().await;
                grant.release();
            });
        }

        barrier.wait().await;
        assert_eq!(coordinator.snapshot().reader_counts, vec![8, 8, 8]);
        barrier.wait().await;

        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }
        assert_eq!(coordinator.snapshot().total_readers(), 0);
    }

    #[tokio::test]
    async fn test_tie_break_is_uniform() {
        let coordinator = Coordinator::with_seed(3, 0xfeed).unwrap();
        let cancel = CancellationToken::new();

        let held = coordinator.acquire_read(&cancel).await.unwrap();
        let loaded = held.replica();

        let mut picks = [0usize; 3];
        for _ in 0..1200 {
            let grant = coordinator.acquire_read(&cancel).await.unwrap();
            picks[grant.replica()] += 1;
        }

        assert_eq!(picks[loaded], 0);
        for (replica, &count) in picks.iter().enumerate() {
            if replica != loaded {
                assert!(count > 480 && count < 720, "picks: {:?}", picks);
            }
        }
    }

    #[tokio::test]
    async fn test_writer_excludes_readers_and_writers() {
        let coordinator = Coordinator::new(3).unwrap();
        let cancel = CancellationToken::new();

        let guard = coordinator.acquire_write(&cancel).await.unwrap();
        let snapshot = coordinator.snapshot();
        assert!(snapshot.writer_active);
        assert_eq!(snapshot.total_readers(), 0);

        // Neither a second writer nor a reader gets in
        assert!(timeout(Duration::from_millis(30), coordinator.acquire_write(&cancel))
            .await
            .is_err());
        assert!(timeout(Duration::from_millis(30), coordinator.acquire_read(&cancel))
            .await
            .is_err());

        // The timed-out writer left the queue
        assert_eq!(coordinator.snapshot().waiting_writers, 0);

        guard.release();
        let grant = timeout(Duration::from_millis(100), coordinator.acquire_read(&cancel))
            .await
            .unwrap()
            .unwrap();
        assert!(!coordinator.snapshot().writer_active);
        grant.release();
    }

    #[tokio::test]
    async fn test_waiting_writer_blocks_new_readers() {
        let coordinator = Arc::new(Coordinator::with_seed(3, 3).unwrap());
        let cancel = CancellationToken::new();

        let first = coordinator.acquire_read(&cancel).await.unwrap();

        let writer = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let guard = coordinator.acquire_write(&cancel).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                guard.release();
            })
        };
        wait_until(&coordinator, |s| s.waiting_writers == 1).await;

        // The reader may not jump ahead of the queued writer
        assert!(timeout(Duration::from_millis(50), coordinator.acquire_read(&cancel))
            .await
            .is_err());

        let late_reader = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let grant = coordinator.acquire_read(&cancel).await.unwrap();
                let snapshot = coordinator.snapshot();
                grant.release();
                snapshot
            })
        };

        first.release();
        writer.await.unwrap();

        let seen = late_reader.await.unwrap();
        assert!(!seen.writer_active);
        assert_eq!(seen.waiting_writers, 0);
    }

    #[tokio::test]
    async fn test_writer_acquires_once_readers_drain() {
        let coordinator = Arc::new(Coordinator::with_seed(3, 4).unwrap());
        let cancel = CancellationToken::new();

        let mut grants = Vec::new();
        for _ in 0..3 {
            grants.push(coordinator.acquire_read(&cancel).await.unwrap());
        }

        let writer = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let guard = coordinator.acquire_write(&cancel).await.unwrap();
                let snapshot = coordinator.snapshot();
                guard.release();
                snapshot
            })
        };
        wait_until(&coordinator, |s| s.waiting_writers == 1).await;

        grants.pop().unwrap().release();
        grants.pop().unwrap().release();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!coordinator.snapshot().writer_active);
        assert_eq!(coordinator.snapshot().waiting_writers, 1);

        grants.pop().unwrap().release();
        let seen = timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();
        assert!(seen.writer_active);
        assert_eq!(seen.total_readers(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_read_takes_nothing() {
        let coordinator = Arc::new(Coordinator::new(3).unwrap());
        let guard = coordinator.acquire_write(&CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let reader = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = cancel.clone();
            tokio::spawn(async move { coordinator.acquire_read(&cancel).await.map(|g| g.replica()) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = reader.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(coordinator.snapshot().reader_counts, vec![0, 0, 0]);

        guard.release();
    }

    #[tokio::test]
    async fn test_cancelled_writer_readmits_readers() {
        let coordinator = Arc::new(Coordinator::new(3).unwrap());
        let cancel = CancellationToken::new();
        let first = coordinator.acquire_read(&cancel).await.unwrap();

        let writer_cancel = CancellationToken::new();
        let writer = {
            let coordinator = Arc::clone(&coordinator);
            let writer_cancel = writer_cancel.clone();
            tokio::spawn(async move { coordinator.acquire_write(&writer_cancel).await.map(|_| ()) })
        };
        wait_until(&coordinator, |s| s.waiting_writers == 1).await;

        // A reader queued behind the writer is released when the writer gives up
        let blocked = {
            let coordinator = Arc::clone(&coordinator);
            let cancel = cancel.clone();
            tokio::spawn(async move { coordinator.acquire_read(&cancel).await.map(|g| g.replica()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!blocked.is_finished());

        writer_cancel.cancel();
        assert!(matches!(writer.await.unwrap(), Err(Error::Cancelled)));
        assert_eq!(coordinator.snapshot().waiting_writers, 0);

        let replica = timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap().unwrap();
        assert!(replica < 3);
        first.release();
        assert_eq!(coordinator.snapshot().total_readers(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion_under_contention() {
        let coordinator = Arc::new(Coordinator::new(3).unwrap());
        let active_writers = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for _ in 0..3 {
            let coordinator = Arc::clone(&coordinator);
            let active_writers = Arc::clone(&active_writers);
            let violations = Arc::clone(&violations);
            tasks.spawn(async move {
                let cancel = CancellationToken::new();
                for _ in 0..20 {
                    let guard = coordinator.acquire_write(&cancel).await.unwrap();
                    if active_writers.fetch_add(1, Ordering::SeqCst) != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    let snapshot = coordinator.snapshot();
                    if !snapshot.writer_active || snapshot.total_readers() != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::task::yield_now().await;
                    active_writers.fetch_sub(1, Ordering::SeqCst);
                    guard.release();
                    tokio::task::yield_now().await;
                }
            });
        }

        for _ in 0..200 {
            let coordinator = Arc::clone(&coordinator);
            let active_writers = Arc::clone(&active_writers);
            let violations = Arc::clone(&violations);
            tasks.spawn(async move {
                let cancel = CancellationToken::new();
                let grant = coordinator.acquire_read(&cancel).await.unwrap();
                let snapshot = coordinator.snapshot();
                if snapshot.writer_active
                    || snapshot.reader_counts[grant.replica()] == 0
                    || active_writers.load(Ordering::SeqCst) != 0
                {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
                grant.release();
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        assert_eq!(violations.load(Ordering::SeqCst), 0);
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.total_readers(), 0);
        assert!(!snapshot.writer_active);
        assert_eq!(snapshot.waiting_writers, 0);
    }
}
