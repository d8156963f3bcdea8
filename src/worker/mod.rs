//! Workers Module
//!
//! Reader and writer tasks that drive the coordinator: acquire access,
//! perform replica I/O while holding it, then release.

mod reader;
mod writer;

pub use reader::{ReadOutcome, ReaderTask};
pub use writer::{WriterSettings, WriterSummary, WriterTask};

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Pick a random duration in `[min, max]`
pub(crate) fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let ms = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Sleep for `duration` unless cancelled first; returns false on cancellation
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
