//! Per-worker counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters updated by one worker and readable from anywhere
#[derive(Debug, Default)]
pub struct WorkerStats {
    iterations: AtomicU64,
    select_attempts: AtomicU64,
    claims: AtomicU64,
    holds: AtomicU64,
    races_lost: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Iterations started
    pub iterations: u64,
    /// Status checks made while looking for a free name
    pub select_attempts: u64,
    /// Identity writes issued
    pub claims: u64,
    /// Completed hold-then-release cycles
    pub holds: u64,
    /// Verifications that found another holder
    pub races_lost: u64,
    /// Iterations aborted by a store error
    pub failures: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_select_attempt(&self) {
        self.select_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_claim(&self) {
        self.claims.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hold(&self) {
        self.holds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_race_lost(&self) {
        self.races_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            select_attempts: self.select_attempts.load(Ordering::Relaxed),
            claims: self.claims.load(Ordering::Relaxed),
            holds: self.holds.load(Ordering::Relaxed),
            races_lost: self.races_lost.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
