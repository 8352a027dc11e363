//! Row lock records and the single-row operations that move them.
//!
//! Every row that takes part in a transaction carries a lock record in the
//! reserved column `!lock:lock`. The record's state is the row's
//! position in the commit protocol:
//!
//! ```text
//!            prewrite                 commit point (primary only)
//!   Stable ───────────▶ Prewritten ─────────────────────────────▶ Committed
//!     ▲                     │                                         │
//!     │     roll back       │                 roll forward            │
//!     └─────────────────────┴─────────────────────────────────────────┘
//! ```
//!
//! Lock records are only ever written with a check-and-mutate keyed on the
//! bytes previously observed in the lock column, so two clients can never
//! both move the same lock.

use crate::error::TxnResult;
use crate::types::{RowRef, Timestamp, TransactionId};
use bytes::Bytes;
use rowtxn_codec::{CodecResult, Decode, Encode, Envelope};
use rowtxn_storage::{Cell, Column, ColumnSelection, KvStore};
use serde::{Deserialize, Serialize};

/// Family of the reserved lock column.
pub const LOCK_FAMILY: &[u8] = b"!lock";

/// Qualifier of the reserved lock column.
pub const LOCK_QUALIFIER: &[u8] = b"lock";

/// The reserved lock column.
pub const LOCK_COLUMN: Column<'static> = Column::new(LOCK_FAMILY, LOCK_QUALIFIER);

/// Persisted format of lock records.
const LOCK_ENVELOPE: Envelope = Envelope::new(*b"RLCK", 1);

/// Position of a row in the commit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// No transaction is in flight; the row's data is committed.
    Stable,
    /// A transaction holds the row and has not reached its commit point.
    Prewritten,
    /// The transaction committed; only ever seen on a primary row.
    Committed,
}

/// The lock record stored in a row's lock column.
///
/// `commit_timestamp` depends on the state: for `Stable` it is the last
/// commit applied to the row, for `Prewritten` it is the row's commit
/// timestamp before the transaction, and for `Committed` it is the commit
/// timestamp of the owning transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLock {
    state: LockState,
    transaction_id: TransactionId,
    commit_timestamp: Timestamp,
    primary: Option<RowRef>,
    secondaries: Vec<RowRef>,
    mutations: Vec<Cell>,
    expiry: u64,
}

impl RowLock {
    /// The lock every row has before any transaction wrote it.
    #[must_use]
    pub fn stable_default() -> Self {
        Self::stable(TransactionId::NONE, Timestamp::ZERO)
    }

    /// A stable lock recording the last commit applied to the row.
    #[must_use]
    pub fn stable(transaction_id: TransactionId, commit_timestamp: Timestamp) -> Self {
        Self {
            state: LockState::Stable,
            transaction_id,
            commit_timestamp,
            primary: None,
            secondaries: Vec::new(),
            mutations: Vec::new(),
            expiry: 0,
        }
    }

    /// A prewritten lock.
    ///
    /// `primary` is `None` on the primary row itself, which instead lists
    /// every `secondaries` row of the transaction.
    #[must_use]
    pub fn prewritten(
        transaction_id: TransactionId,
        prior_commit: Timestamp,
        primary: Option<RowRef>,
        secondaries: Vec<RowRef>,
        mutations: Vec<Cell>,
        expiry: u64,
    ) -> Self {
        Self {
            state: LockState::Prewritten,
            transaction_id,
            commit_timestamp: prior_commit,
            primary,
            secondaries,
            mutations,
            expiry,
        }
    }

    /// Returns this (primary) lock moved to `Committed` at `commit_timestamp`.
    #[must_use]
    pub fn committed(&self, commit_timestamp: Timestamp) -> Self {
        Self {
            state: LockState::Committed,
            commit_timestamp,
            ..self.clone()
        }
    }

    /// Returns the stable lock left behind when this transaction's writes
    /// are applied with `commit_timestamp`.
    #[must_use]
    pub fn rolled_forward(&self, commit_timestamp: Timestamp) -> Self {
        Self::stable(self.transaction_id, commit_timestamp)
    }

    /// Returns the stable lock left behind when this transaction is undone.
    ///
    /// The row keeps the commit timestamp it had before the transaction, so
    /// readers that observed that commit see the row as unchanged.
    #[must_use]
    pub fn rolled_back(&self) -> Self {
        Self::stable(TransactionId::NONE, self.commit_timestamp)
    }

    /// Returns the lock state.
    #[must_use]
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Returns true if no transaction is in flight on the row.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.state == LockState::Stable
    }

    /// Returns the owning (or last committing) transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns the commit timestamp; its meaning depends on the state.
    #[must_use]
    pub fn commit_timestamp(&self) -> Timestamp {
        self.commit_timestamp
    }

    /// Returns the primary row, or `None` if this is the primary.
    #[must_use]
    pub fn primary(&self) -> Option<&RowRef> {
        self.primary.as_ref()
    }

    /// Returns true if this lock sits on its transaction's primary row.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary.is_none()
    }

    /// Returns the secondary rows (primary only).
    #[must_use]
    pub fn secondaries(&self) -> &[RowRef] {
        &self.secondaries
    }

    /// Returns the row's pending cells.
    #[must_use]
    pub fn mutations(&self) -> &[Cell] {
        &self.mutations
    }

    /// Returns the lease expiry in wall-clock milliseconds.
    #[must_use]
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    /// Returns true once the lease has run out.
    #[must_use]
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expiry
    }

    /// Returns the last commit known to be applied to the row, or `None`
    /// while a transaction is past its commit point on it.
    #[must_use]
    pub fn last_commit(&self) -> Option<Timestamp> {
        match self.state {
            LockState::Stable | LockState::Prewritten => Some(self.commit_timestamp),
            LockState::Committed => None,
        }
    }

    /// Returns true if no commit reached the row since `observed` (a stable
    /// lock) was read.
    ///
    /// A rollback rewrites the lock bytes but keeps the commit timestamp, so
    /// it does not count as a change.
    #[must_use]
    pub fn unchanged_since(&self, observed: &RowLock) -> bool {
        self.last_commit() == Some(observed.commit_timestamp)
    }
}

impl Encode for RowLock {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        LOCK_ENVELOPE.seal(self)
    }
}

impl Decode for RowLock {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        LOCK_ENVELOPE.open(bytes)
    }
}

/// Encodes a lock record for the lock column.
///
/// # Errors
///
/// Returns an error if the record cannot be encoded.
pub fn encode(lock: &RowLock) -> TxnResult<Bytes> {
    Ok(Bytes::from(lock.encode()?))
}

/// Decodes the bytes of a lock column. Absent bytes are the default stable lock.
///
/// # Errors
///
/// Returns an error if the bytes are not a lock record.
pub fn decode(bytes: Option<&Bytes>) -> TxnResult<RowLock> {
    match bytes {
        Some(bytes) => Ok(RowLock::decode(bytes)?),
        None => Ok(RowLock::stable_default()),
    }
}

/// Builds the cell that stores `encoded` in the lock column of `row`.
#[must_use]
pub fn lock_cell(row: &RowRef, encoded: Bytes) -> Cell {
    Cell::put(
        row.row().clone(),
        Bytes::from_static(LOCK_FAMILY),
        Bytes::from_static(LOCK_QUALIFIER),
        encoded,
    )
}

/// Returns a selection of the lock column only.
#[must_use]
pub fn lock_selection() -> ColumnSelection {
    ColumnSelection::all().add_column(LOCK_FAMILY, LOCK_QUALIFIER)
}

/// Writes `new` over the lock column if it still holds `expected`.
///
/// Returns the written bytes on success and `None` if another client moved
/// the lock first.
///
/// # Errors
///
/// Returns an error if the store fails; the write may then have happened.
pub fn try_acquire(
    store: &dyn KvStore,
    row: &RowRef,
    expected: Option<&[u8]>,
    new: &RowLock,
) -> TxnResult<Option<Bytes>> {
    let encoded = encode(new)?;
    let applied = store.conditional_put(
        row.table(),
        row.row(),
        LOCK_COLUMN,
        expected,
        encoded.clone(),
    )?;
    Ok(applied.then_some(encoded))
}

/// Reads the lock column of a row.
///
/// Returns `None` when the row has never been locked.
///
/// # Errors
///
/// Returns an error if the store fails or the lock cannot be decoded.
pub fn read(store: &dyn KvStore, row: &RowRef) -> TxnResult<Option<(Bytes, RowLock)>> {
    let snapshot = store.get(row.table(), row.row(), &lock_selection())?;
    match snapshot.value(LOCK_FAMILY, LOCK_QUALIFIER) {
        Some(bytes) => {
            let lock = RowLock::decode(bytes)?;
            Ok(Some((bytes.clone(), lock)))
        }
        None => Ok(None),
    }
}

/// Replaces the lock with `stable` without touching the row's data.
///
/// Used to roll a row back. Returns `false` if the lock no longer holds
/// `expected`.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn clear(
    store: &dyn KvStore,
    row: &RowRef,
    expected: Option<&[u8]>,
    stable: &RowLock,
) -> TxnResult<bool> {
    debug_assert!(stable.is_stable());
    Ok(try_acquire(store, row, expected, stable)?.is_some())
}

/// Applies `mutations` and replaces the lock with `stable` in one
/// check-and-mutate keyed on `expected`.
///
/// Used to roll a row forward. Returns `false` if the lock no longer holds
/// `expected`, in which case nothing was written.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn apply_and_release(
    store: &dyn KvStore,
    row: &RowRef,
    expected: Option<&[u8]>,
    mutations: &[Cell],
    stable: &RowLock,
) -> TxnResult<bool> {
    debug_assert!(stable.is_stable());
    let mut cells = Vec::with_capacity(mutations.len() + 1);
    cells.extend_from_slice(mutations);
    cells.push(lock_cell(row, encode(stable)?));
    cells.sort();
    Ok(store.check_and_mutate(row.table(), row.row(), LOCK_COLUMN, expected, &cells)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowtxn_codec::CodecError;
    use rowtxn_storage::InMemoryStore;

    fn row(key: &'static str) -> RowRef {
        RowRef::new("t", key)
    }

    fn prewritten(txn: u64) -> RowLock {
        RowLock::prewritten(
            TransactionId::new(txn),
            Timestamp::new(1),
            None,
            vec![row("b")],
            vec![Cell::put("a", "data", "v", "1")],
            1_000,
        )
    }

    #[test]
    fn encoding_roundtrip() {
        let lock = prewritten(7);
        let bytes = encode(&lock).unwrap();
        assert_eq!(&bytes[0..4], b"RLCK");
        assert_eq!(decode(Some(&bytes)).unwrap(), lock);
    }

    #[test]
    fn absent_lock_is_stable_default() {
        assert_eq!(decode(None).unwrap(), RowLock::stable_default());
    }

    #[test]
    fn rejects_unknown_format_version() {
        let mut bytes = encode(&prewritten(7)).unwrap().to_vec();
        bytes[4] = 2;
        let err = RowLock::decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion { found: 2, .. }));
    }

    #[test]
    fn transitions_keep_the_right_timestamp() {
        let lock = prewritten(7);
        assert_eq!(lock.last_commit(), Some(Timestamp::new(1)));

        let committed = lock.committed(Timestamp::new(9));
        assert_eq!(committed.state(), LockState::Committed);
        assert_eq!(committed.last_commit(), None);
        assert_eq!(committed.secondaries(), lock.secondaries());

        let forward = committed.rolled_forward(Timestamp::new(9));
        assert!(forward.is_stable());
        assert_eq!(forward.transaction_id(), TransactionId::new(7));
        assert_eq!(forward.commit_timestamp(), Timestamp::new(9));
        assert!(forward.mutations().is_empty());

        let back = lock.rolled_back();
        assert_eq!(back, RowLock::stable(TransactionId::NONE, Timestamp::new(1)));
    }

    #[test]
    fn rollback_is_not_a_change() {
        let observed = RowLock::stable(TransactionId::new(3), Timestamp::new(1));
        assert!(prewritten(7).rolled_back().unchanged_since(&observed));
        assert!(prewritten(7).unchanged_since(&observed));
        assert!(!prewritten(7)
            .rolled_forward(Timestamp::new(9))
            .unchanged_since(&observed));
        assert!(!prewritten(7)
            .committed(Timestamp::new(9))
            .unchanged_since(&observed));
    }

    #[test]
    fn expiry_is_inclusive() {
        let lock = prewritten(7);
        assert!(!lock.is_expired(999));
        assert!(lock.is_expired(1_000));
    }

    #[test]
    fn acquire_keyed_on_observed_bytes() {
        let store = InMemoryStore::new();
        let a = row("a");

        let first = try_acquire(&store, &a, None, &prewritten(7)).unwrap().unwrap();
        assert!(try_acquire(&store, &a, None, &prewritten(8)).unwrap().is_none());

        let (bytes, lock) = read(&store, &a).unwrap().unwrap();
        assert_eq!(bytes, first);
        assert_eq!(lock.transaction_id(), TransactionId::new(7));
    }

    #[test]
    fn apply_and_release_writes_data_and_lock() {
        let store = InMemoryStore::new();
        let a = row("a");
        let lock = prewritten(7);
        let held = try_acquire(&store, &a, None, &lock).unwrap().unwrap();

        let stable = lock.rolled_forward(Timestamp::new(9));
        assert!(apply_and_release(&store, &a, Some(&held[..]), lock.mutations(), &stable).unwrap());
        // Second attempt on the same bytes loses.
        assert!(!apply_and_release(&store, &a, Some(&held[..]), lock.mutations(), &stable).unwrap());

        let snapshot = store.get("t", b"a", &ColumnSelection::all()).unwrap();
        assert_eq!(snapshot.value(b"data", b"v").unwrap(), "1");
        assert_eq!(read(&store, &a).unwrap().unwrap().1, stable);
    }

    #[test]
    fn clear_leaves_data_alone() {
        let store = InMemoryStore::new();
        let a = row("a");
        let lock = prewritten(7);
        let held = try_acquire(&store, &a, None, &lock).unwrap().unwrap();

        assert!(clear(&store, &a, Some(&held[..]), &lock.rolled_back()).unwrap());
        let snapshot = store.get("t", b"a", &ColumnSelection::all()).unwrap();
        assert!(!snapshot.contains_column(b"data", b"v"));
        assert!(read(&store, &a).unwrap().unwrap().1.is_stable());
    }
}
