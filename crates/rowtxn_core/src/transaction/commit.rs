//! Prewrite, commit and rollback.

use super::{Transaction, TransactionState};
use crate::error::{TxnError, TxnResult};
use crate::lock::{self, RowLock};
use crate::manager::{TimestampOracle, TxnContext};
use crate::types::{RowRef, Timestamp, TransactionId};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

impl Transaction {
    /// Locks every written row without committing.
    ///
    /// [`commit`](Self::commit) runs this itself; calling it directly splits
    /// the protocol so the commit point can be taken later (or never).
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::WriteConflict`] if a row changed since it was
    /// observed, [`TxnError::LockContention`] if a row is locked by a live
    /// transaction, or a storage error. Locks taken so far are released
    /// and the transaction is aborted.
    pub fn prewrite(&mut self) -> TxnResult<()> {
        self.ensure_open()?;
        self.state = TransactionState::Prewriting;
        match self.acquire_locks() {
            Ok(()) => {
                self.state = TransactionState::Prewritten;
                Ok(())
            }
            Err(e) => {
                self.release_locks();
                self.abort();
                Err(e)
            }
        }
    }

    /// Commits the transaction.
    ///
    /// A transaction that only read checks that none of its rows changed.
    ///
    /// # Errors
    ///
    /// Any prewrite error, or [`TxnError::WriteConflict`] if another client
    /// resolved the primary lock before the commit point. A storage error
    /// at the commit point leaves the transaction [`TransactionState::Committing`]
    /// with an unknown outcome. Failures after the commit point are logged
    /// and never returned.
    pub fn commit(&mut self) -> TxnResult<()> {
        match self.state {
            TransactionState::Open => self.prewrite()?,
            TransactionState::Prewritten => {}
            other => {
                return Err(TxnError::invalid_operation(format!(
                    "cannot commit a transaction that is {other:?}"
                )))
            }
        }

        let ctx = Arc::clone(&self.ctx);
        let Some((primary, held, primary_lock)) = self.held_primary() else {
            // Nothing was written; prewrite already validated the reads.
            self.state = TransactionState::Committed;
            ctx.stats.record_commit();
            return Ok(());
        };
        let txn_id = primary_lock.transaction_id();

        self.state = TransactionState::Committing;
        let commit_ts = ctx
            .oracle
            .next_after(Timestamp::new(txn_id.as_u64()));
        let committed = primary_lock.committed(commit_ts);
        let committed_bytes =
            match lock::try_acquire(ctx.store.as_ref(), &primary, Some(&held[..]), &committed) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    let err = ctx.conflict(&primary, "primary lock was resolved before commit");
                    self.release_locks();
                    self.abort();
                    return Err(err);
                }
                Err(e) => {
                    warn!(txn = %txn_id, error = %e, "commit point failed, outcome unknown");
                    return Err(e);
                }
            };
        self.commit_timestamp = Some(commit_ts);
        debug!(txn = %txn_id, commit = %commit_ts, %primary, "committed");

        if self.release_secondaries(&ctx, commit_ts) {
            let stable = committed.rolled_forward(commit_ts);
            match lock::apply_and_release(
                ctx.store.as_ref(),
                &primary,
                Some(&committed_bytes[..]),
                committed.mutations(),
                &stable,
            ) {
                Ok(true) => {}
                Ok(false) => debug!(%primary, "primary already rolled forward"),
                Err(e) => warn!(%primary, error = %e, "failed to stabilize primary"),
            }
        } else {
            warn!(txn = %txn_id, %primary, "secondaries left locked, primary stays committed");
        }

        self.state = TransactionState::Committed;
        ctx.stats.record_commit();
        Ok(())
    }

    /// Rolls the transaction back.
    ///
    /// An open transaction discards its buffer. A prewritten one releases
    /// its locks, primary first, without applying any data; lock releases
    /// that fail are left for recovery. Rolling back an aborted transaction
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is past its commit point.
    pub fn rollback(&mut self) -> TxnResult<()> {
        match self.state {
            TransactionState::Open => self.rows.clear(),
            TransactionState::Prewritten => self.release_locks(),
            TransactionState::Aborted => return Ok(()),
            other => {
                return Err(TxnError::invalid_operation(format!(
                    "cannot roll back a transaction that is {other:?}"
                )))
            }
        }
        self.state = TransactionState::RolledBack;
        self.ctx.stats.record_rollback();
        Ok(())
    }

    /// Returns the written rows in lock order: primary first, then
    /// `(table, row)` ascending.
    fn lock_order(&self) -> TxnResult<Vec<RowRef>> {
        let mut order: Vec<RowRef> = self.written_rows().cloned().collect();
        let primary = match &self.primary {
            Some(primary) => {
                if !order.contains(primary) {
                    return Err(TxnError::invalid_operation(format!(
                        "primary {primary} is not written by the transaction"
                    )));
                }
                primary.clone()
            }
            None => match order.first() {
                Some(first) => first.clone(),
                None => return Ok(order),
            },
        };
        order.retain(|row| *row != primary);
        order.insert(0, primary);
        Ok(order)
    }

    fn acquire_locks(&mut self) -> TxnResult<()> {
        let ctx = Arc::clone(&self.ctx);
        let order = self.lock_order()?;
        let Some((primary, secondaries)) = order.split_first() else {
            return self.validate_reads(&ctx);
        };

        let floor = self
            .rows
            .values()
            .map(|state| state.observed_lock.commit_timestamp())
            .max()
            .unwrap_or(Timestamp::ZERO);
        let txn_id = TransactionId::from(ctx.oracle.next_after(floor));
        let expiry = TimestampOracle::wall_clock_millis()
            .saturating_add(ctx.config.lock_timeout_millis());
        self.transaction_id = Some(txn_id);
        self.primary = Some(primary.clone());

        for row in &order {
            let Some(state) = self.rows.get(row) else {
                continue;
            };
            let mutations = state
                .mutation
                .as_ref()
                .map(|m| m.to_cells())
                .unwrap_or_default();
            let prior = state.observed_lock.commit_timestamp();
            let lock = if row == primary {
                RowLock::prewritten(txn_id, prior, None, secondaries.to_vec(), mutations, expiry)
            } else {
                RowLock::prewritten(
                    txn_id,
                    prior,
                    Some(primary.clone()),
                    Vec::new(),
                    mutations,
                    expiry,
                )
            };
            let held = acquire_row(&ctx, row, state.observed.clone(), &state.observed_lock, &lock)?;
            debug!(txn = %txn_id, %row, "prewrote row");
            if let Some(state) = self.rows.get_mut(row) {
                state.held = Some((held, lock));
            }
        }

        self.validate_reads(&ctx)
    }

    /// Checks that no row the transaction only read was committed since,
    /// and that no other transaction holds a lock on one.
    ///
    /// A row locked by another writer may commit after this transaction
    /// does, so it fails validation even though its commit timestamp has
    /// not moved yet.
    fn validate_reads(&self, ctx: &TxnContext) -> TxnResult<()> {
        for (row, state) in self.rows.iter().filter(|(_, s)| !s.is_written()) {
            let current = lock::read(ctx.store.as_ref(), row)?
                .map(|(_, lock)| lock)
                .unwrap_or_else(RowLock::stable_default);
            if !current.is_stable() {
                return Err(ctx.conflict(row, "row read by the transaction is locked by a writer"));
            }
            if !current.unchanged_since(&state.observed_lock) {
                return Err(ctx.conflict(row, "row read by the transaction was committed since"));
            }
        }
        Ok(())
    }

    fn held_primary(&self) -> Option<(RowRef, Bytes, RowLock)> {
        let primary = self.primary.as_ref()?;
        let (bytes, lock) = self.rows.get(primary)?.held.clone()?;
        Some((primary.clone(), bytes, lock))
    }

    /// Applies and stabilizes every secondary. Returns false if any of them
    /// could not be written.
    fn release_secondaries(&self, ctx: &TxnContext, commit_ts: Timestamp) -> bool {
        let mut all_stable = true;
        for (row, state) in &self.rows {
            if Some(row) == self.primary.as_ref() {
                continue;
            }
            let Some((held, lock)) = &state.held else {
                continue;
            };
            let stable = lock.rolled_forward(commit_ts);
            let mut attempts = 0;
            loop {
                match lock::apply_and_release(
                    ctx.store.as_ref(),
                    row,
                    Some(&held[..]),
                    lock.mutations(),
                    &stable,
                ) {
                    Ok(true) => break,
                    // Rolled forward by another client, or by our own
                    // attempt whose reply was lost.
                    Ok(false) => {
                        debug!(%row, "secondary already stable");
                        break;
                    }
                    Err(e) if attempts < ctx.config.cleanup_retry_attempts => {
                        attempts += 1;
                        debug!(%row, error = %e, attempts, "retrying secondary");
                    }
                    Err(e) => {
                        warn!(%row, error = %e, "failed to stabilize secondary");
                        all_stable = false;
                        break;
                    }
                }
            }
        }
        all_stable
    }

    /// Best-effort release of every lock taken at prewrite, primary first.
    fn release_locks(&mut self) {
        let mut order: Vec<RowRef> = Vec::with_capacity(self.rows.len());
        if let Some(primary) = &self.primary {
            order.push(primary.clone());
        }
        order.extend(
            self.rows
                .iter()
                .filter(|(row, state)| state.held.is_some() && Some(*row) != self.primary.as_ref())
                .map(|(row, _)| row.clone()),
        );

        let store = Arc::clone(&self.ctx.store);
        for row in order {
            let Some((held, lock)) = self.rows.get_mut(&row).and_then(|s| s.held.take()) else {
                continue;
            };
            match lock::clear(store.as_ref(), &row, Some(&held[..]), &lock.rolled_back()) {
                Ok(true) => debug!(%row, "released lock"),
                Ok(false) => debug!(%row, "lock already resolved"),
                Err(e) => warn!(%row, error = %e, "failed to release lock"),
            }
        }
    }
}

/// Moves one row's lock from the observed bytes to `lock`.
///
/// If the conditional write loses, the row is re-read: a row whose lock was
/// resolved without a commit in between is retried once; any other change
/// is a conflict.
fn acquire_row(
    ctx: &TxnContext,
    row: &RowRef,
    observed: Option<Bytes>,
    observed_lock: &RowLock,
    lock: &RowLock,
) -> TxnResult<Bytes> {
    let store = ctx.store.as_ref();
    if let Some(held) = lock::try_acquire(store, row, observed.as_deref(), lock)? {
        return Ok(held);
    }

    let (mut bytes, mut current) = read_lock(ctx, row)?;
    if !current.is_stable() {
        let resolution =
            ctx.resolver()
                .resolve(row, &bytes.clone().unwrap_or_default(), &current)?;
        debug!(%row, ?resolution, "resolved lock during prewrite");
        (bytes, current) = read_lock(ctx, row)?;
    }
    if !current.is_stable() || !current.unchanged_since(observed_lock) {
        return Err(ctx.conflict(row, "row was committed by another transaction"));
    }

    lock::try_acquire(store, row, bytes.as_deref(), lock)?
        .ok_or_else(|| ctx.conflict(row, "lost the lock to another transaction"))
}

fn read_lock(ctx: &TxnContext, row: &RowRef) -> TxnResult<(Option<Bytes>, RowLock)> {
    Ok(match lock::read(ctx.store.as_ref(), row)? {
        Some((bytes, lock)) => (Some(bytes), lock),
        None => (None, RowLock::stable_default()),
    })
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::TxnError;
    use crate::lock::{self, LockState};
    use crate::manager::TransactionManager;
    use crate::mutation::{Delete, Put};
    use crate::transaction::TransactionState;
    use crate::types::RowRef;
    use bytes::Bytes;
    use rowtxn_storage::{ColumnSelection, InMemoryStore, KvStore, RowRange};
    use std::ops::Bound;
    use std::sync::Arc;
    use std::time::Duration;

    fn manager() -> (Arc<InMemoryStore>, TransactionManager) {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::new().read_retry_attempts(0);
        let manager = TransactionManager::new(store.clone(), config);
        (store, manager)
    }

    fn read(manager: &TransactionManager, row: &[u8]) -> Option<Bytes> {
        let mut txn = manager.begin();
        let snapshot = txn.get("t", row, &ColumnSelection::all()).unwrap();
        txn.commit().unwrap();
        snapshot.value(b"f", b"q").cloned()
    }

    fn write(manager: &TransactionManager, row: &'static str, value: &'static str) {
        let mut txn = manager.begin();
        txn.put("t", Put::new(row).add("f", "q", value)).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn commit_applies_every_row_and_stabilizes_locks() {
        let (store, manager) = manager();
        let mut txn = manager.begin();
        txn.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        txn.put("t", Put::new("b").add("f", "q", "2")).unwrap();
        txn.put("u", Put::new("c").add("f", "q", "3")).unwrap();
        txn.commit().unwrap();

        assert_eq!(txn.state(), TransactionState::Committed);
        let commit_ts = txn.commit_timestamp().unwrap();
        assert!(commit_ts.as_u64() > txn.transaction_id().unwrap().as_u64());

        for row in [RowRef::new("t", "a"), RowRef::new("t", "b"), RowRef::new("u", "c")] {
            let (_, held) = lock::read(store.as_ref(), &row).unwrap().unwrap();
            assert!(held.is_stable());
            assert_eq!(held.commit_timestamp(), commit_ts);
        }
        assert_eq!(read(&manager, b"b").unwrap(), "2");
        assert_eq!(manager.stats().committed(), 2);
    }

    #[test]
    fn reads_see_own_writes() {
        let (_, manager) = manager();
        write(&manager, "a", "old");

        let mut txn = manager.begin();
        txn.put("t", Put::new("a").add("f", "q", "new")).unwrap();
        let row = txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        assert_eq!(row.value(b"f", b"q").unwrap(), "new");
        txn.rollback().unwrap();

        assert_eq!(read(&manager, b"a").unwrap(), "old");
    }

    #[test]
    fn delete_family_then_put_in_one_transaction() {
        let (_, manager) = manager();
        let mut txn = manager.begin();
        txn.put("t", Put::new("a").add("f", "q", "1").add("f", "r", "2"))
            .unwrap();
        txn.commit().unwrap();

        let mut txn = manager.begin();
        txn.delete("t", Delete::new("a").delete_family("f")).unwrap();
        txn.put("t", Put::new("a").add("f", "r", "3")).unwrap();
        let view = txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        assert_eq!(view.len(), 1);
        txn.commit().unwrap();

        let mut txn = manager.begin();
        let row = txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        assert!(!row.contains_column(b"f", b"q"));
        assert_eq!(row.value(b"f", b"r").unwrap(), "3");
    }

    #[test]
    fn first_committer_wins() {
        let (_, manager) = manager();
        write(&manager, "a", "0");

        let mut first = manager.begin();
        let mut second = manager.begin();
        first.get("t", b"a", &ColumnSelection::all()).unwrap();
        second.get("t", b"a", &ColumnSelection::all()).unwrap();
        first.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        second.put("t", Put::new("a").add("f", "q", "2")).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, TxnError::WriteConflict { .. }));
        assert_eq!(second.state(), TransactionState::Aborted);
        assert_eq!(read(&manager, b"a").unwrap(), "1");
    }

    #[test]
    fn live_lock_blocks_prewrite() {
        let (_, manager) = manager();
        let mut holder = manager.begin();
        holder.put("t", Put::new("a").add("f", "q", "1")).unwrap();

        let mut other = manager.begin();
        other.put("t", Put::new("a").add("f", "q", "2")).unwrap();

        holder.prewrite().unwrap();
        let err = other.commit().unwrap_err();
        assert!(err.is_retryable());
        holder.commit().unwrap();
        assert_eq!(read(&manager, b"a").unwrap(), "1");
    }

    #[test]
    fn read_only_rows_are_validated() {
        let (_, manager) = manager();
        write(&manager, "a", "0");

        let mut txn = manager.begin();
        txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        txn.put("t", Put::new("b").add("f", "q", "x")).unwrap();

        write(&manager, "a", "1");
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, TxnError::WriteConflict { ref row, .. } if *row == RowRef::new("t", "a")));
        assert_eq!(read(&manager, b"b"), None);
    }

    #[test]
    fn read_only_commit_checks_reads() {
        let (_, manager) = manager();
        write(&manager, "a", "0");

        let mut txn = manager.begin();
        txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        write(&manager, "a", "1");
        assert!(txn.commit().is_err());

        let mut txn = manager.begin();
        txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        txn.commit().unwrap();
        assert!(txn.transaction_id().is_none());
    }

    #[test]
    fn crossing_read_and_write_sets_cannot_both_commit() {
        let (_, manager) = manager();
        write(&manager, "a", "1");
        write(&manager, "b", "1");

        let mut first = manager.begin();
        first.get("t", b"a", &ColumnSelection::all()).unwrap();
        first.put("t", Put::new("b").add("f", "q", "0")).unwrap();

        let mut second = manager.begin();
        second.get("t", b"b", &ColumnSelection::all()).unwrap();
        second.put("t", Put::new("a").add("f", "q", "0")).unwrap();

        first.prewrite().unwrap();
        let err = second.prewrite().unwrap_err();
        assert!(matches!(err, TxnError::WriteConflict { ref row, .. } if *row == RowRef::new("t", "b")));
        assert_eq!(second.state(), TransactionState::Aborted);
        first.commit().unwrap();

        assert_eq!(read(&manager, b"a").unwrap(), "1");
        assert_eq!(read(&manager, b"b").unwrap(), "0");
    }

    #[test]
    fn read_row_prewritten_by_another_writer_fails_validation() {
        let (store, manager) = manager();
        write(&manager, "a", "0");

        let mut reader = manager.begin();
        reader.get("t", b"a", &ColumnSelection::all()).unwrap();

        let mut writer = manager.begin();
        writer.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        writer.prewrite().unwrap();

        let err = reader.commit().unwrap_err();
        assert!(matches!(err, TxnError::WriteConflict { .. }));
        assert_eq!(reader.state(), TransactionState::Aborted);

        writer.rollback().unwrap();
        let (_, released) = lock::read(store.as_ref(), &RowRef::new("t", "a")).unwrap().unwrap();
        assert!(released.is_stable());

        let mut reader = manager.begin();
        reader.get("t", b"a", &ColumnSelection::all()).unwrap();
        reader.commit().unwrap();
    }

    #[test]
    fn repeated_read_of_changed_row_conflicts() {
        let (_, manager) = manager();
        write(&manager, "a", "0");

        let mut txn = manager.begin();
        txn.get("t", b"a", &ColumnSelection::all()).unwrap();
        write(&manager, "a", "1");
        let err = txn.get("t", b"a", &ColumnSelection::all()).unwrap_err();
        assert!(matches!(err, TxnError::WriteConflict { .. }));
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn rollback_after_prewrite_releases_locks() {
        let (store, manager) = manager();
        write(&manager, "a", "0");

        let mut txn = manager.begin();
        txn.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        txn.put("t", Put::new("b").add("f", "q", "1")).unwrap();
        txn.prewrite().unwrap();
        let (_, held) = lock::read(store.as_ref(), &RowRef::new("t", "b")).unwrap().unwrap();
        assert_eq!(held.state(), LockState::Prewritten);

        txn.rollback().unwrap();
        assert_eq!(txn.state(), TransactionState::RolledBack);
        for row in ["a", "b"] {
            let (_, held) = lock::read(store.as_ref(), &RowRef::new("t", row)).unwrap().unwrap();
            assert!(held.is_stable());
        }
        assert_eq!(read(&manager, b"a").unwrap(), "0");
        assert_eq!(read(&manager, b"b"), None);
        // The rolled-back row can be written again right away.
        write(&manager, "a", "2");
    }

    #[test]
    fn explicit_primary_is_locked_first() {
        let (store, manager) = manager();
        let mut txn = manager.begin();
        txn.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        txn.put("t", Put::new("z").add("f", "q", "1")).unwrap();
        txn.set_primary("t", "z").unwrap();
        txn.prewrite().unwrap();

        let (_, primary) = lock::read(store.as_ref(), &RowRef::new("t", "z")).unwrap().unwrap();
        assert!(primary.is_primary());
        assert_eq!(primary.secondaries(), &[RowRef::new("t", "a")]);
        let (_, secondary) = lock::read(store.as_ref(), &RowRef::new("t", "a")).unwrap().unwrap();
        assert_eq!(secondary.primary(), Some(&RowRef::new("t", "z")));
        txn.commit().unwrap();
    }

    #[test]
    fn primary_must_be_written() {
        let (_, manager) = manager();
        let mut txn = manager.begin();
        txn.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        txn.set_primary("t", "elsewhere").unwrap();
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, TxnError::InvalidOperation { .. }));
    }

    #[test]
    fn lock_family_is_reserved() {
        let (_, manager) = manager();
        let mut txn = manager.begin();
        let err = txn
            .put("t", Put::new("a").add(lock::LOCK_FAMILY, "x", "1"))
            .unwrap_err();
        assert!(matches!(err, TxnError::InvalidOperation { .. }));
    }

    #[test]
    fn finished_transactions_reject_work() {
        let (_, manager) = manager();
        let mut txn = manager.begin();
        txn.commit().unwrap();
        assert!(txn.get("t", b"a", &ColumnSelection::all()).is_err());
        assert!(txn.commit().is_err());
        assert!(txn.rollback().is_err());
    }

    #[test]
    fn scan_merges_buffer_and_store() {
        let (_, manager) = manager();
        write(&manager, "a", "1");
        write(&manager, "c", "3");
        write(&manager, "d", "4");

        let mut txn = manager.begin();
        txn.put("t", Put::new("b").add("f", "q", "2")).unwrap();
        txn.delete("t", Delete::new("c").delete_column("f", "q")).unwrap();
        txn.put("t", Put::new("z").add("f", "q", "out of range")).unwrap();

        let rows: Vec<_> = txn
            .scan("t", &RowRange::between("a", "e"), &ColumnSelection::all())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.row().unwrap().clone()).collect();
        assert_eq!(keys, vec!["a", "b", "d"]);
        txn.commit().unwrap();
    }

    #[test]
    fn qualifier_range_read() {
        let (_, manager) = manager();
        let mut txn = manager.begin();
        txn.put(
            "t",
            Put::new("a").add_all("f", [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]),
        )
        .unwrap();
        txn.commit().unwrap();

        let mut txn = manager.begin();
        let row = txn
            .get_columns_in_range(
                "t",
                b"a",
                "f",
                Bound::Included(Bytes::from_static(b"b")),
                Bound::Excluded(Bytes::from_static(b"d")),
            )
            .unwrap();
        let values: Vec<_> = row.values().map(|(_, _, v)| v.clone()).collect();
        assert_eq!(values, vec!["2", "3"]);
    }

    #[test]
    fn expired_lock_is_recovered_on_read() {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::new().lock_timeout(Duration::ZERO);
        let manager = TransactionManager::new(store.clone(), config);
        write(&manager, "a", "0");

        let mut crashed = manager.begin();
        crashed.put("t", Put::new("a").add("f", "q", "1")).unwrap();
        crashed.prewrite().unwrap();
        drop(crashed);

        assert_eq!(read(&manager, b"a").unwrap(), "0");
        assert_eq!(manager.stats().recovered_backward(), 1);
        let lock = lock::read(store.as_ref() as &dyn KvStore, &RowRef::new("t", "a"))
            .unwrap()
            .unwrap()
            .1;
        assert!(lock.is_stable());
    }
}
