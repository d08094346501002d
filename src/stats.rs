//! Process-wide request counters.
//!
//! Two monotonically non-decreasing counters shared by every connection
//! task and every completion callback: `success` counts frames whose
//! response was handed to a connection writer, `fail` counts framing
//! rejects, lost workers, responses with nowhere to go, and connections
//! torn down by a transport error. A delivered response whose body says
//! `status: ERROR` still counts as a success here; the counters track
//! delivery, not command outcome.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared success/fail counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    success: AtomicU64,
    fail: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub success: u64,
    pub fail: u64,
}

impl StatsSnapshot {
    /// Sum of both counters.
    pub fn total(&self) -> u64 {
        self.success + self.fail
    }
}

impl ServerStats {
    /// Create a fresh counter pair, both zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame whose response reached the connection writer.
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed frame or connection.
    pub fn record_fail(&self) {
        self.fail.fetch_add(1, Ordering::Relaxed);
    }

    /// Read both counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
        }
    }
}
