//! Transaction statistics.
//!
//! Counters for transaction outcomes and for stale locks resolved by this
//! client. Recovery counters are the observable record of every stale lock
//! that was rolled forward or back.

use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction statistics.
///
/// All counters are atomic and can be read while transactions are running.
#[derive(Debug, Default)]
pub struct TxnStats {
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    rolled_back: AtomicU64,
    conflicts: AtomicU64,
    contentions: AtomicU64,
    recovered_forward: AtomicU64,
    recovered_backward: AtomicU64,
    lost_races: AtomicU64,
}

impl TxnStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contention(&self) {
        self.contentions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rolled_forward(&self) {
        self.recovered_forward.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rolled_back(&self) {
        self.recovered_backward.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost_race(&self) {
        self.lost_races.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of transactions begun.
    pub fn begun(&self) -> u64 {
        self.begun.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions committed.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions aborted by a conflict or error.
    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Returns the number of explicit rollbacks.
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Returns the number of write conflicts raised.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of lock contention errors raised.
    pub fn contentions(&self) -> u64 {
        self.contentions.load(Ordering::Relaxed)
    }

    /// Returns the number of stale transactions rolled forward by recovery.
    pub fn recovered_forward(&self) -> u64 {
        self.recovered_forward.load(Ordering::Relaxed)
    }

    /// Returns the number of stale transactions rolled back by recovery.
    pub fn recovered_backward(&self) -> u64 {
        self.recovered_backward.load(Ordering::Relaxed)
    }

    /// Returns how often recovery found its work already done by another client.
    pub fn lost_races(&self) -> u64 {
        self.lost_races.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            begun: self.begun(),
            committed: self.committed(),
            aborted: self.aborted(),
            rolled_back: self.rolled_back(),
            conflicts: self.conflicts(),
            contentions: self.contentions(),
            recovered_forward: self.recovered_forward(),
            recovered_backward: self.recovered_backward(),
            lost_races: self.lost_races(),
        }
    }
}

/// A point-in-time snapshot of [`TxnStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Transactions begun.
    pub begun: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions aborted.
    pub aborted: u64,
    /// Explicit rollbacks.
    pub rolled_back: u64,
    /// Write conflicts raised.
    pub conflicts: u64,
    /// Lock contention errors raised.
    pub contentions: u64,
    /// Stale transactions rolled forward.
    pub recovered_forward: u64,
    /// Stale transactions rolled back.
    pub recovered_backward: u64,
    /// Recoveries that found the lock already resolved.
    pub lost_races: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = TxnStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_outcomes() {
        let stats = TxnStats::new();
        stats.record_begin();
        stats.record_begin();
        stats.record_commit();
        stats.record_abort();
        stats.record_conflict();
        stats.record_rolled_forward();

        let snap = stats.snapshot();
        assert_eq!(snap.begun, 2);
        assert_eq!(snap.committed, 1);
        assert_eq!(snap.aborted, 1);
        assert_eq!(snap.conflicts, 1);
        assert_eq!(snap.recovered_forward, 1);
        assert_eq!(snap.recovered_backward, 0);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(TxnStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_begin();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.begun(), 800);
    }
}
