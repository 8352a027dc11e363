//! Store trait definition.

use crate::cell::{Cell, CellType};
use crate::error::StorageResult;
use crate::row::RowSnapshot;
use crate::selection::{ColumnSelection, RowRange};
use bytes::Bytes;

/// A lazy sequence of rows returned by [`KvStore::scan`].
///
/// The sequence is finite and not restartable: after an error, a new scan
/// must be issued from the last row that was fully consumed.
pub type RowScanner<'a> = Box<dyn Iterator<Item = StorageResult<RowSnapshot>> + Send + 'a>;

/// A column address used as the condition of a check-and-mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column<'a> {
    /// Column family.
    pub family: &'a [u8],
    /// Column qualifier.
    pub qualifier: &'a [u8],
}

impl<'a> Column<'a> {
    /// Creates a column address.
    #[must_use]
    pub const fn new(family: &'a [u8], qualifier: &'a [u8]) -> Self {
        Self { family, qualifier }
    }
}

/// A sharded, row-atomic key-value store.
///
/// Stores are **single-row atomic**: every call touches exactly one row,
/// except `scan`, which reads many rows without any cross-row consistency.
/// Nothing built on this trait may assume atomicity across rows.
///
/// # Invariants
///
/// - `check_and_mutate` compares and applies in one atomic step per row
/// - at most one of several racing `check_and_mutate` calls with the same
///   expected value succeeds
/// - reads observe every successful write that completed before them
/// - implementations are `Send + Sync` and shared by concurrent transactions
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and embedding
pub trait KvStore: Send + Sync {
    /// Reads the selected columns of one row.
    ///
    /// A missing row yields an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn get(&self, table: &str, row: &[u8], selection: &ColumnSelection)
        -> StorageResult<RowSnapshot>;

    /// Scans the selected columns of every row in `range`, in row order.
    ///
    /// Rows with no selected cells are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot be opened. Errors met while
    /// iterating are yielded by the scanner.
    fn scan<'a>(
        &'a self,
        table: &str,
        range: &RowRange,
        selection: &ColumnSelection,
    ) -> StorageResult<RowScanner<'a>>;

    /// Atomically applies `mutations` to `row` if `column` currently holds
    /// `expected` (`None` means the column must be absent).
    ///
    /// Returns `false`, without writing, when the check fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached. The write may or may
    /// not have been applied in that case.
    fn check_and_mutate(
        &self,
        table: &str,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        mutations: &[Cell],
    ) -> StorageResult<bool>;

    /// Applies `mutations` to `row` unconditionally.
    ///
    /// Only used for writes whose outcome has already been decided.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn mutate(&self, table: &str, row: &[u8], mutations: &[Cell]) -> StorageResult<()>;

    /// Conditionally replaces the value of one column.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn conditional_put(
        &self,
        table: &str,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        value: Bytes,
    ) -> StorageResult<bool> {
        let cell = Cell::new(
            Bytes::copy_from_slice(row),
            Bytes::copy_from_slice(column.family),
            Some(Bytes::copy_from_slice(column.qualifier)),
            value,
            CellType::Put,
        );
        self.check_and_mutate(table, row, column, expected, &[cell])
    }
}
