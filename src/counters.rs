//! Per-worker outcome counters.
//!
//! Every stage worker owns one [`StageCounters`] set. The counters only ever
//! grow; the statistics aggregator reads them once at the end through
//! [`StageCounters::snapshot`] and the monitor reads them live.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone processed/failed/reworked counters, shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct StageCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    reworked: AtomicU64,
}

/// Point-in-time copy of one counter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub reworked: u64,
}

impl StageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_reworked(&self) {
        self.reworked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            reworked: self.reworked.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    /// Element-wise sum, used to fold all instances of one stage together.
    pub fn merge(self, other: CounterSnapshot) -> CounterSnapshot {
        CounterSnapshot {
            processed: self.processed + other.processed,
            failed: self.failed + other.failed,
            reworked: self.reworked + other.reworked,
        }
    }
}
