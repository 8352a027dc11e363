//! Row snapshots.

use crate::cell::{Cell, CellType};
use bytes::Bytes;
use std::cmp::Ordering;

/// An ordered set of cells sharing one row key.
///
/// Cells are kept in [`Cell`] order, which makes column lookups a binary
/// search. An empty snapshot means the row has no visible cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSnapshot {
    row: Option<Bytes>,
    cells: Vec<Cell>,
}

impl RowSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a snapshot from cells already sorted in [`Cell`] order.
    ///
    /// All cells are assumed to share the first cell's row.
    #[must_use]
    pub fn from_sorted(cells: Vec<Cell>) -> Self {
        debug_assert!(cells.windows(2).all(|w| w[0] <= w[1]));
        let row = cells.first().map(|c| c.row().clone());
        debug_assert!(cells.iter().all(|c| Some(c.row()) == row.as_ref()));
        Self { row, cells }
    }

    /// Creates a snapshot from cells in any order.
    #[must_use]
    pub fn from_cells(mut cells: Vec<Cell>) -> Self {
        cells.sort();
        Self::from_sorted(cells)
    }

    /// Returns the row key, or `None` when the snapshot is empty.
    #[must_use]
    pub fn row(&self) -> Option<&Bytes> {
        self.row.as_ref()
    }

    /// Returns the cells in order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Consumes the snapshot and returns its cells.
    #[must_use]
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Returns the number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the snapshot holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the value stored at `(family, qualifier)`.
    #[must_use]
    pub fn value(&self, family: &[u8], qualifier: &[u8]) -> Option<&Bytes> {
        self.position(family, qualifier)
            .map(|pos| self.cells[pos].value())
    }

    /// Returns true if the column holds a value.
    #[must_use]
    pub fn contains_column(&self, family: &[u8], qualifier: &[u8]) -> bool {
        self.value(family, qualifier).is_some()
    }

    /// Removes the cell at `(family, qualifier)` and returns it.
    pub fn take_column(&mut self, family: &[u8], qualifier: &[u8]) -> Option<Cell> {
        let pos = self.position(family, qualifier)?;
        let cell = self.cells.remove(pos);
        if self.cells.is_empty() {
            self.row = None;
        }
        Some(cell)
    }

    /// Iterates `(family, qualifier, value)` for every put cell.
    pub fn values(&self) -> impl Iterator<Item = (&Bytes, &Bytes, &Bytes)> {
        self.cells.iter().filter_map(|c| match (c.cell_type(), c.qualifier()) {
            (CellType::Put, Some(q)) => Some((c.family(), q, c.value())),
            _ => None,
        })
    }

    fn position(&self, family: &[u8], qualifier: &[u8]) -> Option<usize> {
        let row = self.row.clone()?;
        let probe = Cell::first_on_column(
            row,
            Bytes::copy_from_slice(family),
            Bytes::copy_from_slice(qualifier),
        );
        // The probe never matches exactly: it sorts before every real cell
        // of the column.
        let pos = self
            .cells
            .partition_point(|c| c.cmp_key(&probe) == Ordering::Less);
        let cell = self.cells.get(pos)?;
        (cell.matching_column(family, qualifier) && cell.cell_type() == CellType::Put)
            .then_some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RowSnapshot {
        RowSnapshot::from_cells(vec![
            Cell::put("row", "data", "b", "2"),
            Cell::put("row", "data", "a", "1"),
            Cell::put("row", "meta", "a", "3"),
        ])
    }

    #[test]
    fn value_lookup() {
        let snapshot = sample();
        assert_eq!(snapshot.value(b"data", b"a").unwrap(), "1");
        assert_eq!(snapshot.value(b"data", b"b").unwrap(), "2");
        assert_eq!(snapshot.value(b"meta", b"a").unwrap(), "3");
        assert!(snapshot.value(b"data", b"c").is_none());
        assert!(snapshot.value(b"zzz", b"a").is_none());
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = RowSnapshot::empty();
        assert!(snapshot.is_empty());
        assert!(snapshot.row().is_none());
        assert!(snapshot.value(b"data", b"a").is_none());
    }

    #[test]
    fn row_is_taken_from_cells() {
        assert_eq!(sample().row().unwrap(), "row");
        assert_eq!(sample().len(), 3);
    }

    #[test]
    fn take_column_removes_cell() {
        let mut snapshot = sample();
        let cell = snapshot.take_column(b"data", b"a").unwrap();
        assert_eq!(cell.value(), "1");
        assert!(!snapshot.contains_column(b"data", b"a"));
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.take_column(b"data", b"a").is_none());
    }

    #[test]
    fn values_iterates_in_order() {
        let snapshot = sample();
        let values: Vec<_> = snapshot.values().map(|(_, _, v)| v.clone()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
