//! Multi-row transactions.
//!
//! A [`Transaction`] buffers every write on the client and reads through
//! its own buffer. Nothing is locked until [`Transaction::prewrite`] (run by
//! [`Transaction::commit`]), which writes a lock record on every written row:
//!
//! 1. **Prewrite**: lock the primary row, then every secondary in
//!    `(table, row)` order, each with a check-and-mutate keyed on the lock
//!    bytes the transaction observed. Rows that were only read are then
//!    checked for commits that happened since they were read.
//! 2. **Commit point**: flip the primary lock from `Prewritten` to
//!    `Committed`. From here on the transaction is committed, whatever
//!    happens to this client.
//! 3. **Secondaries**: apply each secondary's writes and stabilize its lock
//!    in one conditional write.
//! 4. **Primary**: once every secondary is stable, apply the primary's writes
//!    and stabilize it. Otherwise it stays `Committed` for recovery.
//!
//! Conflicts are first-committer-wins: a transaction that finds a row
//! changed since it observed it fails with [`crate::TxnError::WriteConflict`].

mod commit;
mod state;

pub use state::TransactionState;

pub(crate) use state::RowState;

use crate::error::{TxnError, TxnResult};
use crate::lock::{self, RowLock, LOCK_FAMILY, LOCK_QUALIFIER};
use crate::manager::TxnContext;
use crate::mutation::{Delete, Mutation, Put};
use crate::scanner::{merge_view, TransactionScanner};
use crate::types::{RowRef, Timestamp, TransactionId};
use bytes::Bytes;
use rowtxn_storage::{ColumnSelection, RowRange, RowSnapshot};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// A client-side transaction over many rows and tables.
///
/// Transactions are created by [`crate::TransactionManager::begin`] and end
/// with exactly one of [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping an unfinished transaction does not
/// roll it back: locks it already wrote stay until their lease expires and
/// another client resolves them.
pub struct Transaction {
    ctx: Arc<TxnContext>,
    state: TransactionState,
    rows: BTreeMap<RowRef, RowState>,
    primary: Option<RowRef>,
    transaction_id: Option<TransactionId>,
    commit_timestamp: Option<Timestamp>,
}

impl Transaction {
    pub(crate) fn new(ctx: Arc<TxnContext>) -> Self {
        Self {
            ctx,
            state: TransactionState::Open,
            rows: BTreeMap::new(),
            primary: None,
            transaction_id: None,
            commit_timestamp: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the transaction id, assigned at prewrite.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    /// Returns the commit timestamp, assigned at the commit point.
    #[must_use]
    pub fn commit_timestamp(&self) -> Option<Timestamp> {
        self.commit_timestamp
    }

    /// Returns the primary row: the one chosen with
    /// [`set_primary`](Self::set_primary), or the one picked at prewrite.
    #[must_use]
    pub fn primary(&self) -> Option<&RowRef> {
        self.primary.as_ref()
    }

    /// Returns the rows this transaction writes.
    pub fn written_rows(&self) -> impl Iterator<Item = &RowRef> + '_ {
        self.rows
            .iter()
            .filter(|(_, state)| state.is_written())
            .map(|(row, _)| row)
    }

    /// Reads the selected columns of a row, including this transaction's
    /// own pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::LockContention`] if the row stays locked by a live
    /// transaction, [`TxnError::WriteConflict`] if the row changed since this
    /// transaction first read it, or a storage error.
    pub fn get(
        &mut self,
        table: &str,
        row: &[u8],
        selection: &ColumnSelection,
    ) -> TxnResult<RowSnapshot> {
        self.ensure_open()?;
        let row_ref = RowRef::new(table, Bytes::copy_from_slice(row));
        let store_selection = selection.including(LOCK_FAMILY, LOCK_QUALIFIER);
        let fetched = self.ctx.store.get(table, row, &store_selection)?;
        self.read_row(&row_ref, fetched, selection)
    }

    /// Reads the columns of one family whose qualifiers fall inside the
    /// bounds.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn get_columns_in_range(
        &mut self,
        table: &str,
        row: &[u8],
        family: impl Into<Bytes>,
        start: Bound<Bytes>,
        end: Bound<Bytes>,
    ) -> TxnResult<RowSnapshot> {
        let selection = ColumnSelection::all().add_qualifier_range(family, start, end);
        self.get(table, row, &selection)
    }

    /// Scans the rows of `range` as this transaction sees them.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not open. Errors met while
    /// scanning are yielded by the scanner.
    pub fn scan(
        &mut self,
        table: &str,
        range: &RowRange,
        selection: &ColumnSelection,
    ) -> TxnResult<TransactionScanner<'_>> {
        self.ensure_open()?;
        Ok(TransactionScanner::new(self, table, range, selection))
    }

    /// Buffers the puts of one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not open, the put touches the
    /// reserved lock family, or the row's lock cannot be read.
    pub fn put(&mut self, table: &str, put: Put) -> TxnResult<()> {
        self.ensure_open()?;
        self.buffer(table, put.into())
    }

    /// Buffers the puts of several rows.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn put_all(&mut self, table: &str, puts: impl IntoIterator<Item = Put>) -> TxnResult<()> {
        for put in puts {
            self.put(table, put)?;
        }
        Ok(())
    }

    /// Buffers the deletes of one row.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn delete(&mut self, table: &str, delete: Delete) -> TxnResult<()> {
        self.ensure_open()?;
        self.buffer(table, delete.into())
    }

    /// Buffers the deletes of several rows.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn delete_all(
        &mut self,
        table: &str,
        deletes: impl IntoIterator<Item = Delete>,
    ) -> TxnResult<()> {
        for delete in deletes {
            self.delete(table, delete)?;
        }
        Ok(())
    }

    /// Chooses the primary row. It must be a row the transaction writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not open.
    pub fn set_primary(&mut self, table: &str, row: impl Into<Bytes>) -> TxnResult<()> {
        self.ensure_open()?;
        self.primary = Some(RowRef::new(table, row));
        Ok(())
    }

    pub(crate) fn context(&self) -> &Arc<TxnContext> {
        &self.ctx
    }

    fn ensure_open(&self) -> TxnResult<()> {
        if self.state != TransactionState::Open {
            return Err(TxnError::invalid_operation(format!(
                "transaction is {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn buffer(&mut self, table: &str, mutation: Mutation) -> TxnResult<()> {
        if mutation.is_empty() {
            return Ok(());
        }
        if mutation.touches_family(LOCK_FAMILY) {
            return Err(TxnError::invalid_operation("the lock family is reserved"));
        }
        let row_ref = RowRef::new(table, mutation.row().clone());
        self.ensure_observed(&row_ref)?;
        if let Some(state) = self.rows.get_mut(&row_ref) {
            state.buffer(mutation);
        }
        Ok(())
    }

    /// Reads the lock of a row this transaction has not seen yet.
    fn ensure_observed(&mut self, row_ref: &RowRef) -> TxnResult<()> {
        if self.rows.contains_key(row_ref) {
            return Ok(());
        }
        let selection = lock::lock_selection();
        let fetched = self
            .ctx
            .store
            .get(row_ref.table(), row_ref.row(), &selection)?;
        let (bytes, lock, _) = self.stabilize(row_ref, fetched, &selection)?;
        self.observe(row_ref, bytes, lock)
    }

    /// Resolves a fetched row's lock, observes it, and merges the buffer.
    pub(crate) fn read_row(
        &mut self,
        row_ref: &RowRef,
        fetched: RowSnapshot,
        selection: &ColumnSelection,
    ) -> TxnResult<RowSnapshot> {
        let store_selection = selection.including(LOCK_FAMILY, LOCK_QUALIFIER);
        let (bytes, lock, data) = self.stabilize(row_ref, fetched, &store_selection)?;
        self.observe(row_ref, bytes, lock)?;
        let buffered = self
            .rows
            .get(row_ref)
            .and_then(|state| state.mutation.as_ref());
        Ok(merge_view(buffered, data, selection))
    }

    /// Returns the next row after `after` (or from the range start) that has
    /// buffered writes.
    pub(crate) fn next_buffered_row(
        &self,
        table: &str,
        range: &RowRange,
        after: Option<&Bytes>,
    ) -> Option<Bytes> {
        let lower = match after {
            Some(row) => Bound::Excluded(RowRef::new(table, row.clone())),
            None => Bound::Included(RowRef::new(table, range.start().cloned().unwrap_or_default())),
        };
        self.rows
            .range((lower, Bound::Unbounded))
            .take_while(|(row, _)| row.table() == table)
            .find(|(row, state)| state.is_written() && range.contains(row.row()))
            .map(|(row, _)| row.row().clone())
    }

    /// Splits the lock off a fetched row, resolving it until it is stable.
    ///
    /// A live lock is waited on up to `read_retry_attempts` times.
    fn stabilize(
        &self,
        row_ref: &RowRef,
        mut snapshot: RowSnapshot,
        store_selection: &ColumnSelection,
    ) -> TxnResult<(Option<Bytes>, RowLock, RowSnapshot)> {
        let config = &self.ctx.config;
        let mut waits = 0;
        let mut rounds = 0;
        loop {
            let bytes = snapshot
                .take_column(LOCK_FAMILY, LOCK_QUALIFIER)
                .map(|cell| cell.value().clone());
            let lock = lock::decode(bytes.as_ref())?;
            if lock.is_stable() {
                return Ok((bytes, lock, snapshot));
            }
            // Every resolution either waits or changes the lock; the bound
            // only guards against a row that keeps being relocked.
            rounds += 1;
            if rounds > config.read_retry_attempts.saturating_add(MAX_RESOLUTIONS) {
                return Err(TxnError::lock_contention(
                    row_ref.clone(),
                    lock.transaction_id(),
                ));
            }

            let held = bytes.unwrap_or_default();
            match self.ctx.resolver().resolve(row_ref, &held, &lock) {
                Ok(resolution) => {
                    debug!(row = %row_ref, ?resolution, "resolved lock before read");
                }
                Err(TxnError::LockContention { .. }) if waits < config.read_retry_attempts => {
                    waits += 1;
                    thread::sleep(config.read_retry_backoff);
                }
                Err(e) => return Err(e),
            }
            snapshot = self
                .ctx
                .store
                .get(row_ref.table(), row_ref.row(), store_selection)?;
        }
    }

    /// Records the lock a read observed.
    ///
    /// A row read twice must show the same committed state both times.
    fn observe(&mut self, row_ref: &RowRef, bytes: Option<Bytes>, lock: RowLock) -> TxnResult<()> {
        let Some(state) = self.rows.get_mut(row_ref) else {
            self.rows
                .insert(row_ref.clone(), RowState::observed(bytes, lock));
            return Ok(());
        };
        if state.observed == bytes {
            return Ok(());
        }
        if lock.unchanged_since(&state.observed_lock) {
            state.observed = bytes;
            state.observed_lock = lock;
            return Ok(());
        }
        let err = self
            .ctx
            .conflict(row_ref, "row changed since the transaction first read it");
        self.abort();
        Err(err)
    }

    fn abort(&mut self) {
        self.state = TransactionState::Aborted;
        self.ctx.stats.record_abort();
    }
}

/// Resolutions a read attempts beyond its waits on live locks.
const MAX_RESOLUTIONS: u32 = 8;

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("transaction_id", &self.transaction_id)
            .field("primary", &self.primary)
            .field("rows", &self.rows.len())
            .finish_non_exhaustive()
    }
}
