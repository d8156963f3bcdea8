//! Coordinator status snapshot

use serde::Serialize;
use std::fmt;

/// Point-in-time view of the coordinator, copied under its mutex
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Active readers per replica, indexed by replica id
    pub reader_counts: Vec<usize>,
    /// Whether a writer currently holds exclusive access
    pub writer_active: bool,
    /// Writers queued for exclusive access
    pub waiting_writers: usize,
}

impl Snapshot {
    /// Total readers across all replicas
    pub fn total_readers(&self) -> usize {
        self.reader_counts.iter().sum()
    }

    /// Largest difference in reader count between any two replicas
    pub fn load_spread(&self) -> usize {
        let max = self.reader_counts.iter().max().copied().unwrap_or(0);
        let min = self.reader_counts.iter().min().copied().unwrap_or(0);
        max - min
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = self.reader_counts.iter().map(|c| c.to_string()).collect();
        write!(
            f,
            "Readers per replica [{}]; Writer active: {}",
            counts.join(","),
            self.writer_active
        )
    }
}
