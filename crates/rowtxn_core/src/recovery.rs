//! Stale lock recovery.
//!
//! Any client that meets a lock left behind by a crashed or stalled
//! transaction may finish that transaction's work once the lock's lease has
//! run out. The primary row decides the outcome:
//!
//! - primary `Committed`: the transaction committed; every row is rolled
//!   forward, secondaries first, then the primary.
//! - primary `Prewritten`: the transaction never reached its commit point;
//!   the primary is rolled back first (which forbids the commit from ever
//!   happening), then every secondary.
//! - primary `Stable`: already decided. A secondary still `Prewritten` is
//!   rolled forward only if the primary's stable lock names its
//!   transaction; otherwise it is rolled back.
//!
//! Every write is a check-and-mutate keyed on the bytes the resolver read, so
//! concurrent resolvers cannot disagree: one wins, the others lose the race
//! and change nothing.

use crate::error::{TxnError, TxnResult};
use crate::lock::{self, LockState, RowLock};
use crate::manager::TimestampOracle;
use crate::stats::TxnStats;
use crate::types::{RowRef, Timestamp};
use bytes::Bytes;
use rowtxn_storage::KvStore;
use tracing::{debug, info, warn};

/// Outcome of resolving one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The lock was already stable; nothing to do.
    AlreadyStable,
    /// The transaction was found committed and its writes were applied.
    RolledForward,
    /// The transaction was found uncommitted and its locks were released.
    RolledBack,
    /// Another client moved the lock first; nothing was written.
    LostRace,
}

/// Resolves locks left behind by other transactions.
pub struct RecoveryResolver<'a> {
    store: &'a dyn KvStore,
    stats: &'a TxnStats,
}

impl<'a> RecoveryResolver<'a> {
    /// Creates a resolver over `store`, counting outcomes in `stats`.
    pub fn new(store: &'a dyn KvStore, stats: &'a TxnStats) -> Self {
        Self { store, stats }
    }

    /// Resolves `lock`, read from `row` as `lock_bytes`, against the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::LockContention`] if the lease has not expired,
    /// or a storage error if the store fails midway. A failed resolution
    /// leaves every row in a state a later resolution can finish.
    pub fn resolve(
        &self,
        row: &RowRef,
        lock_bytes: &Bytes,
        lock: &RowLock,
    ) -> TxnResult<Resolution> {
        self.resolve_at(row, lock_bytes, lock, TimestampOracle::wall_clock_millis())
    }

    /// Resolves `lock` as if the wall clock read `now_millis`.
    ///
    /// # Errors
    ///
    /// Same as [`RecoveryResolver::resolve`].
    pub fn resolve_at(
        &self,
        row: &RowRef,
        lock_bytes: &Bytes,
        lock: &RowLock,
        now_millis: u64,
    ) -> TxnResult<Resolution> {
        if lock.is_stable() {
            return Ok(Resolution::AlreadyStable);
        }
        if !lock.is_expired(now_millis) {
            self.stats.record_contention();
            return Err(TxnError::lock_contention(row.clone(), lock.transaction_id()));
        }

        let resolution = match lock.primary() {
            None => self.resolve_primary(row, lock_bytes, lock)?,
            Some(primary) => self.resolve_secondary(row, lock_bytes, lock, primary, now_millis)?,
        };

        match resolution {
            Resolution::RolledForward => {
                self.stats.record_rolled_forward();
                info!(%row, txn = %lock.transaction_id(), "rolled stale transaction forward");
            }
            Resolution::RolledBack => {
                self.stats.record_rolled_back();
                info!(%row, txn = %lock.transaction_id(), "rolled stale transaction back");
            }
            Resolution::LostRace => {
                self.stats.record_lost_race();
                debug!(%row, txn = %lock.transaction_id(), "stale lock already resolved");
            }
            Resolution::AlreadyStable => {}
        }
        Ok(resolution)
    }

    fn resolve_secondary(
        &self,
        row: &RowRef,
        lock_bytes: &Bytes,
        lock: &RowLock,
        primary: &RowRef,
        now_millis: u64,
    ) -> TxnResult<Resolution> {
        let Some((primary_bytes, primary_lock)) = lock::read(self.store, primary)? else {
            return self.roll_back_row(row, lock_bytes, lock);
        };

        if primary_lock.transaction_id() != lock.transaction_id() {
            return self.roll_back_row(row, lock_bytes, lock);
        }
        match primary_lock.state() {
            LockState::Stable => {
                self.roll_forward_row(row, lock_bytes, lock, primary_lock.commit_timestamp())
            }
            LockState::Prewritten | LockState::Committed => {
                if !primary_lock.is_expired(now_millis) {
                    self.stats.record_contention();
                    return Err(TxnError::lock_contention(
                        primary.clone(),
                        primary_lock.transaction_id(),
                    ));
                }
                self.resolve_primary(primary, &primary_bytes, &primary_lock)
            }
        }
    }

    fn resolve_primary(
        &self,
        row: &RowRef,
        lock_bytes: &Bytes,
        lock: &RowLock,
    ) -> TxnResult<Resolution> {
        match lock.state() {
            LockState::Stable => Ok(Resolution::AlreadyStable),
            LockState::Committed => {
                let commit_ts = lock.commit_timestamp();
                for secondary in lock.secondaries() {
                    if let Some((bytes, held)) = self.pending_secondary(secondary, lock)? {
                        // A lost race here means another client rolled it forward.
                        lock::apply_and_release(
                            self.store,
                            secondary,
                            Some(&bytes[..]),
                            held.mutations(),
                            &held.rolled_forward(commit_ts),
                        )?;
                    }
                }
                self.roll_forward_row(row, lock_bytes, lock, commit_ts)
            }
            LockState::Prewritten => {
                if !lock::clear(self.store, row, Some(&lock_bytes[..]), &lock.rolled_back())? {
                    return Ok(Resolution::LostRace);
                }
                for secondary in lock.secondaries() {
                    if let Err(e) = self.roll_back_secondary(secondary, lock) {
                        // The primary is stable now, so the secondary path
                        // rolls this row back the next time it is read.
                        warn!(row = %secondary, error = %e, "failed to roll back secondary");
                    }
                }
                Ok(Resolution::RolledBack)
            }
        }
    }

    fn roll_back_secondary(&self, secondary: &RowRef, primary_lock: &RowLock) -> TxnResult<()> {
        if let Some((bytes, held)) = self.pending_secondary(secondary, primary_lock)? {
            lock::clear(self.store, secondary, Some(&bytes[..]), &held.rolled_back())?;
        }
        Ok(())
    }

    /// Reads a secondary's lock if it is still prewritten by the primary's
    /// transaction.
    fn pending_secondary(
        &self,
        secondary: &RowRef,
        primary_lock: &RowLock,
    ) -> TxnResult<Option<(Bytes, RowLock)>> {
        Ok(lock::read(self.store, secondary)?.filter(|(_, held)| {
            held.state() == LockState::Prewritten
                && held.transaction_id() == primary_lock.transaction_id()
        }))
    }

    fn roll_forward_row(
        &self,
        row: &RowRef,
        lock_bytes: &Bytes,
        lock: &RowLock,
        commit_ts: Timestamp,
    ) -> TxnResult<Resolution> {
        let applied = lock::apply_and_release(
            self.store,
            row,
            Some(&lock_bytes[..]),
            lock.mutations(),
            &lock.rolled_forward(commit_ts),
        )?;
        Ok(if applied {
            Resolution::RolledForward
        } else {
            Resolution::LostRace
        })
    }

    fn roll_back_row(
        &self,
        row: &RowRef,
        lock_bytes: &Bytes,
        lock: &RowLock,
    ) -> TxnResult<Resolution> {
        let cleared = lock::clear(self.store, row, Some(&lock_bytes[..]), &lock.rolled_back())?;
        Ok(if cleared {
            Resolution::RolledBack
        } else {
            Resolution::LostRace
        })
    }
}
