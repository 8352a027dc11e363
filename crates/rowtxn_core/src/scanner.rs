//! Merged reads over buffered and stored cells.
//!
//! A transaction sees its own pending writes: every read merges the row's
//! buffered [`Mutation`] with the cells fetched from the store. Each input
//! is a [`CellSource`] tagged with a sequence id; lower ids are newer and
//! win, so the buffer is `0` and the store is `1`.

use crate::error::TxnResult;
use crate::lock::{LOCK_FAMILY, LOCK_QUALIFIER};
use crate::mutation::Mutation;
use crate::transaction::Transaction;
use crate::types::RowRef;
use bytes::Bytes;
use rowtxn_storage::{Cell, ColumnSelection, RowRange, RowSnapshot};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

/// Sequence id of a transaction's own buffered cells.
pub const BUFFER_SEQUENCE: u64 = 0;

/// Sequence id of cells read from the store.
pub const STORE_SEQUENCE: u64 = 1;

/// Rows fetched from the store per scan round trip.
const SCAN_BATCH: usize = 32;

/// A sorted run of cells with a merge priority.
pub struct CellSource {
    sequence_id: u64,
    cells: VecDeque<Cell>,
}

impl CellSource {
    /// Creates a source from cells in [`Cell`] order.
    #[must_use]
    pub fn new(sequence_id: u64, cells: Vec<Cell>) -> Self {
        debug_assert!(cells.windows(2).all(|w| w[0] <= w[1]));
        Self {
            sequence_id,
            cells: cells.into(),
        }
    }

    /// Returns the sequence id. Lower is newer.
    #[must_use]
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    fn peek(&self) -> Option<&Cell> {
        self.cells.front()
    }
}

/// Merges the sources of one row into the put cells a reader sees.
///
/// Cells come out in [`Cell`] order. When several sources hold a cell at the
/// same coordinate, the one with the lowest sequence id wins. A delete hides
/// the cells it covers in every source with a higher sequence id. Deletes
/// themselves and the lock column are never returned.
#[must_use]
pub fn merge_row(mut sources: Vec<CellSource>) -> Vec<Cell> {
    let mut out: Vec<Cell> = Vec::new();
    let mut deletes: Vec<(u64, Cell)> = Vec::new();

    loop {
        // Pick the smallest head; ties go to the newest source.
        let mut best: Option<usize> = None;
        for (i, source) in sources.iter().enumerate() {
            let Some(cell) = source.peek() else {
                continue;
            };
            let better = match best.and_then(|b| sources[b].peek().map(|c| (b, c))) {
                None => true,
                Some((b, current)) => match cell.cmp_key(current) {
                    Ordering::Less => true,
                    Ordering::Equal => source.sequence_id < sources[b].sequence_id,
                    Ordering::Greater => false,
                },
            };
            if better {
                best = Some(i);
            }
        }
        let Some(i) = best else {
            break;
        };
        let sequence_id = sources[i].sequence_id;
        let Some(cell) = sources[i].cells.pop_front() else {
            break;
        };

        if cell.family().as_ref() == LOCK_FAMILY {
            continue;
        }
        if cell.cell_type().is_delete() {
            deletes.push((sequence_id, cell));
            continue;
        }
        let hidden = deletes
            .iter()
            .any(|(seq, delete)| *seq < sequence_id && delete.covers(&cell));
        let shadowed = out.last().is_some_and(|last| last.cmp_key(&cell) == Ordering::Equal);
        if !hidden && !shadowed {
            out.push(cell);
        }
    }
    out
}

/// Merges a row's buffered mutation over its stored cells and keeps the
/// columns `selection` asks for.
///
/// Buffered deletes apply even when the stored row was fetched with a
/// narrower selection.
#[must_use]
pub fn merge_view(
    buffered: Option<&Mutation>,
    stored: RowSnapshot,
    selection: &ColumnSelection,
) -> RowSnapshot {
    let mut sources = Vec::with_capacity(2);
    if let Some(mutation) = buffered {
        sources.push(CellSource::new(BUFFER_SEQUENCE, mutation.to_cells()));
    }
    sources.push(CellSource::new(STORE_SEQUENCE, stored.into_cells()));

    let cells = merge_row(sources)
        .into_iter()
        .filter(|c| selection.matches(c.family(), c.qualifier().map_or(&[][..], |q| &q[..])))
        .collect();
    RowSnapshot::from_sorted(cells)
}

/// Lazy scan over a table as seen by one transaction.
///
/// Yields the union of stored rows and rows with buffered writes in the
/// range, in row order, each merged with the transaction's buffer. Rows
/// that end up empty are skipped. Stored rows are fetched in batches; every
/// row is observed by the transaction (locks resolved, repeatable-read
/// checks applied) as it is yielded.
///
/// After an error the scanner is finished and must not be resumed; start a
/// new scan after the last row that was consumed.
pub struct TransactionScanner<'t> {
    txn: &'t mut Transaction,
    table: String,
    range: RowRange,
    selection: ColumnSelection,
    store_selection: ColumnSelection,
    pending: VecDeque<RowSnapshot>,
    last: Option<Bytes>,
    store_done: bool,
    done: bool,
}

impl<'t> TransactionScanner<'t> {
    pub(crate) fn new(
        txn: &'t mut Transaction,
        table: &str,
        range: &RowRange,
        selection: &ColumnSelection,
    ) -> Self {
        Self {
            txn,
            table: table.to_string(),
            range: range.clone(),
            selection: selection.clone(),
            store_selection: selection.including(LOCK_FAMILY, LOCK_QUALIFIER),
            pending: VecDeque::new(),
            last: None,
            store_done: false,
            done: false,
        }
    }

    fn fill(&mut self) -> TxnResult<()> {
        let range = match &self.last {
            Some(last) => self.range.after(last),
            None => self.range.clone(),
        };
        let store = Arc::clone(&self.txn.context().store);
        let mut rows = store.scan(&self.table, &range, &self.store_selection)?;
        for _ in 0..SCAN_BATCH {
            match rows.next() {
                Some(row) => self.pending.push_back(row?),
                None => {
                    self.store_done = true;
                    break;
                }
            }
        }
        Ok(())
    }

    fn step(&mut self) -> TxnResult<Option<RowSnapshot>> {
        loop {
            if self.pending.is_empty() && !self.store_done {
                self.fill()?;
            }
            let stored_key = self.pending.front().and_then(|r| r.row().cloned());
            let buffered_key = self
                .txn
                .next_buffered_row(&self.table, &self.range, self.last.as_ref());

            let key = match (&stored_key, buffered_key) {
                (None, None) => return Ok(None),
                (Some(stored), None) => stored.clone(),
                (None, Some(buffered)) => buffered,
                (Some(stored), Some(buffered)) => stored.clone().min(buffered),
            };
            let fetched = if stored_key.as_ref() == Some(&key) {
                self.pending.pop_front().unwrap_or_default()
            } else {
                RowSnapshot::empty()
            };
            self.last = Some(key.clone());

            let row_ref = RowRef::new(self.table.clone(), key);
            let snapshot = self.txn.read_row(&row_ref, fetched, &self.selection)?;
            if !snapshot.is_empty() {
                return Ok(Some(snapshot));
            }
        }
    }
}

impl Iterator for TransactionScanner<'_> {
    type Item = TxnResult<RowSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for TransactionScanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScanner")
            .field("table", &self.table)
            .field("range", &self.range)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
