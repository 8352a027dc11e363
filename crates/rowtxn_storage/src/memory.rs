//! In-memory store for testing and embedding.

use crate::backend::{Column, KvStore, RowScanner};
use crate::cell::{Cell, CellType};
use crate::error::{StorageError, StorageResult};
use crate::row::RowSnapshot;
use crate::selection::{ColumnSelection, RowRange};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

/// Columns of one stored row: `(family, qualifier) -> value`.
type StoredRow = BTreeMap<(Bytes, Bytes), Bytes>;

/// Rows of one table, ordered by key.
type StoredTable = BTreeMap<Bytes, StoredRow>;

/// An in-memory, single-version, row-atomic store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit and integration tests
/// - Embedding the transaction layer without a remote store
///
/// # Thread Safety
///
/// The store is thread-safe and meant to be shared behind an `Arc`. Each call
/// takes the table lock once, which makes every single-row operation atomic.
///
/// # Example
///
/// ```rust
/// use rowtxn_storage::{Cell, ColumnSelection, InMemoryStore, KvStore};
///
/// let store = InMemoryStore::new();
/// store.mutate("users", b"alice", &[Cell::put("alice", "data", "age", "30")]).unwrap();
/// let row = store.get("users", b"alice", &ColumnSelection::all()).unwrap();
/// assert_eq!(row.value(b"data", b"age").unwrap(), "30");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, StoredTable>>,
    closed: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the store. Every later call fails with [`StorageError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns the number of rows stored in `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn snapshot(row_key: &Bytes, stored: &StoredRow, selection: &ColumnSelection) -> RowSnapshot {
        // Stored columns are ordered by (family, qualifier) and are all puts,
        // which is already cell order.
        let cells = stored
            .iter()
            .filter(|((family, qualifier), _)| selection.matches(family, qualifier))
            .map(|((family, qualifier), value)| {
                Cell::put(
                    row_key.clone(),
                    family.clone(),
                    qualifier.clone(),
                    value.clone(),
                )
            })
            .collect();
        RowSnapshot::from_sorted(cells)
    }

    fn validate(row: &[u8], mutations: &[Cell]) -> StorageResult<()> {
        for cell in mutations {
            if cell.row().as_ref() != row {
                return Err(StorageError::invalid_argument(
                    "mutation cell does not belong to the mutated row",
                ));
            }
            match cell.cell_type() {
                CellType::Minimum | CellType::Maximum => {
                    return Err(StorageError::invalid_argument(format!(
                        "cell type {:?} cannot be written",
                        cell.cell_type()
                    )));
                }
                CellType::Put | CellType::Delete | CellType::DeleteColumn
                    if cell.qualifier().is_none() =>
                {
                    return Err(StorageError::invalid_argument(
                        "column mutation without a qualifier",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(stored: &mut StoredRow, mutations: &[Cell]) {
        for cell in mutations {
            let family = cell.family().clone();
            match cell.cell_type() {
                CellType::Put => {
                    let qualifier = cell.qualifier().cloned().unwrap_or_default();
                    stored.insert((family, qualifier), cell.value().clone());
                }
                CellType::Delete | CellType::DeleteColumn => {
                    let qualifier = cell.qualifier().cloned().unwrap_or_default();
                    stored.remove(&(family, qualifier));
                }
                CellType::DeleteFamily | CellType::DeleteFamilyVersion => {
                    stored.retain(|(f, _), _| *f != family);
                }
                // Rejected by validate().
                CellType::Minimum | CellType::Maximum => {}
            }
        }
    }

    fn write_row(&self, table: &str, row: &[u8], mutations: &[Cell]) {
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        Self::apply_to_table(rows, row, mutations);
    }

    fn apply_to_table(rows: &mut StoredTable, row: &[u8], mutations: &[Cell]) {
        let key = Bytes::copy_from_slice(row);
        let stored = rows.entry(key.clone()).or_default();
        Self::apply(stored, mutations);
        if stored.is_empty() {
            rows.remove(&key);
        }
    }
}

impl KvStore for InMemoryStore {
    fn get(
        &self,
        table: &str,
        row: &[u8],
        selection: &ColumnSelection,
    ) -> StorageResult<RowSnapshot> {
        self.ensure_open()?;
        let tables = self.tables.read();
        let snapshot = tables
            .get(table)
            .and_then(|rows| rows.get_key_value(row))
            .map(|(key, stored)| Self::snapshot(key, stored, selection))
            .unwrap_or_default();
        Ok(snapshot)
    }

    fn scan<'a>(
        &'a self,
        table: &str,
        range: &RowRange,
        selection: &ColumnSelection,
    ) -> StorageResult<RowScanner<'a>> {
        self.ensure_open()?;
        let (lower, _) = range.bounds();
        // An inverted range is empty.
        let done = matches!((range.start(), range.stop()), (Some(s), Some(e)) if s > e);
        Ok(Box::new(MemoryScanner {
            store: self,
            table: table.to_string(),
            range: range.clone(),
            lower,
            selection: selection.clone(),
            done,
        }))
    }

    fn check_and_mutate(
        &self,
        table: &str,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        mutations: &[Cell],
    ) -> StorageResult<bool> {
        self.ensure_open()?;
        Self::validate(row, mutations)?;

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        let current = rows.get(row).and_then(|stored| {
            stored
                .iter()
                .find(|((f, q), _)| f.as_ref() == column.family && q.as_ref() == column.qualifier)
                .map(|(_, value)| value.as_ref())
        });
        if current != expected {
            return Ok(false);
        }
        Self::apply_to_table(rows, row, mutations);
        Ok(true)
    }

    fn mutate(&self, table: &str, row: &[u8], mutations: &[Cell]) -> StorageResult<()> {
        self.ensure_open()?;
        Self::validate(row, mutations)?;
        self.write_row(table, row, mutations);
        Ok(())
    }
}

/// Lazy scanner over an [`InMemoryStore`] table.
///
/// Each step takes the table lock, finds the next row after the last one
/// returned, and releases the lock again.
struct MemoryScanner<'a> {
    store: &'a InMemoryStore,
    table: String,
    range: RowRange,
    lower: Bound<Bytes>,
    selection: ColumnSelection,
    done: bool,
}

impl Iterator for MemoryScanner<'_> {
    type Item = StorageResult<RowSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.store.ensure_open() {
            self.done = true;
            return Some(Err(e));
        }

        let store = self.store;
        let tables = store.tables.read();
        let Some(rows) = tables.get(&self.table) else {
            self.done = true;
            return None;
        };
        let (_, upper) = self.range.bounds();
        for (key, stored) in rows.range((self.lower.clone(), upper)) {
            self.lower = Bound::Excluded(key.clone());
            let snapshot = InMemoryStore::snapshot(key, stored, &self.selection);
            if !snapshot.is_empty() {
                return Some(Ok(snapshot));
            }
        }
        self.done = true;
        None
    }
}
