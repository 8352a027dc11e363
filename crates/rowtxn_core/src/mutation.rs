//! Buffered writes.
//!
//! A transaction never writes data cells directly: [`Put`] and [`Delete`]
//! builders are folded into one [`Mutation`] per row, which is shipped inside
//! the row's lock at prewrite and applied when the transaction commits.

use bytes::Bytes;
use rowtxn_storage::{Cell, CellType};
use std::collections::BTreeMap;

/// Pending cells of one row.
///
/// Holds at most one cell per `(family, qualifier)`; a family delete is kept
/// under an absent qualifier, which sorts before every column of the family.
/// Iteration is therefore in [`Cell`] order, the order in which the cells
/// must be applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    row: Bytes,
    cells: BTreeMap<(Bytes, Option<Bytes>), Cell>,
}

impl Mutation {
    /// Creates an empty mutation for `row`.
    pub fn new(row: impl Into<Bytes>) -> Self {
        Self {
            row: row.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Returns the row key.
    #[must_use]
    pub fn row(&self) -> &Bytes {
        &self.row
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the number of buffered cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Iterates the buffered cells in [`Cell`] order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.values()
    }

    /// Returns the buffered cells in [`Cell`] order.
    #[must_use]
    pub fn to_cells(&self) -> Vec<Cell> {
        self.cells.values().cloned().collect()
    }

    /// Returns true if any buffered cell is in `family`.
    #[must_use]
    pub fn touches_family(&self, family: &[u8]) -> bool {
        self.cells.keys().any(|(f, _)| f.as_ref() == family)
    }

    /// Folds one cell into the buffer.
    ///
    /// - a put or column delete replaces whatever was buffered for its column
    /// - a family delete drops every buffered cell of the family first
    ///
    /// Sentinel types are ignored.
    pub fn add(&mut self, cell: Cell) {
        debug_assert_eq!(cell.row(), &self.row);
        let family = cell.family().clone();
        match cell.cell_type() {
            CellType::Put | CellType::Delete | CellType::DeleteColumn => {
                let qualifier = cell.qualifier().cloned();
                self.cells.insert((family, qualifier), cell);
            }
            CellType::DeleteFamily | CellType::DeleteFamilyVersion => {
                self.cells.retain(|(f, _), _| *f != family);
                self.cells.insert((family, None), cell);
            }
            CellType::Minimum | CellType::Maximum => {}
        }
    }

    /// Folds a later mutation of the same row into this one.
    pub fn merge(&mut self, later: Mutation) {
        for cell in later.cells.into_values() {
            self.add(cell);
        }
    }
}

/// Builder for the puts of one row.
///
/// ```
/// use rowtxn_core::Put;
///
/// let put = Put::new("alice")
///     .add("data", "age", "30")
///     .add_all("meta", [("created", "2024"), ("owner", "bob")]);
/// assert_eq!(put.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    row: Bytes,
    cells: Vec<Cell>,
}

impl Put {
    /// Starts a put on `row`.
    pub fn new(row: impl Into<Bytes>) -> Self {
        Self {
            row: row.into(),
            cells: Vec::new(),
        }
    }

    /// Adds one column value.
    #[must_use]
    pub fn add(
        mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        self.cells
            .push(Cell::put(self.row.clone(), family, qualifier, value));
        self
    }

    /// Adds several columns of one family.
    #[must_use]
    pub fn add_all<I, Q, V>(mut self, family: impl Into<Bytes>, columns: I) -> Self
    where
        I: IntoIterator<Item = (Q, V)>,
        Q: Into<Bytes>,
        V: Into<Bytes>,
    {
        let family = family.into();
        for (qualifier, value) in columns {
            self.cells
                .push(Cell::put(self.row.clone(), family.clone(), qualifier, value));
        }
        self
    }

    /// Returns the row key.
    #[must_use]
    pub fn row(&self) -> &Bytes {
        &self.row
    }

    /// Returns the number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if no column was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Builder for the deletes of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    row: Bytes,
    cells: Vec<Cell>,
}

impl Delete {
    /// Starts a delete on `row`.
    pub fn new(row: impl Into<Bytes>) -> Self {
        Self {
            row: row.into(),
            cells: Vec::new(),
        }
    }

    /// Deletes one column.
    #[must_use]
    pub fn delete_column(mut self, family: impl Into<Bytes>, qualifier: impl Into<Bytes>) -> Self {
        self.cells
            .push(Cell::delete_column(self.row.clone(), family, qualifier));
        self
    }

    /// Deletes every column of a family.
    #[must_use]
    pub fn delete_family(mut self, family: impl Into<Bytes>) -> Self {
        self.cells.push(Cell::delete_family(self.row.clone(), family));
        self
    }

    /// Returns the row key.
    #[must_use]
    pub fn row(&self) -> &Bytes {
        &self.row
    }

    /// Returns true if nothing is deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

fn fold(row: Bytes, cells: Vec<Cell>) -> Mutation {
    let mut mutation = Mutation::new(row);
    for cell in cells {
        mutation.add(cell);
    }
    mutation
}

impl From<Put> for Mutation {
    fn from(put: Put) -> Self {
        fold(put.row, put.cells)
    }
}

impl From<Delete> for Mutation {
    fn from(delete: Delete) -> Self {
        fold(delete.row, delete.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(mutation: &Mutation) -> Vec<(String, CellType)> {
        mutation
            .cells()
            .map(|c| {
                let q = c
                    .qualifier()
                    .map(|q| String::from_utf8_lossy(q).into_owned())
                    .unwrap_or_default();
                (
                    format!("{}:{}", String::from_utf8_lossy(c.family()), q),
                    c.cell_type(),
                )
            })
            .collect()
    }

    #[test]
    fn put_replaces_put() {
        let mut m = Mutation::from(Put::new("r").add("f", "q", "1"));
        m.merge(Put::new("r").add("f", "q", "2").into());
        assert_eq!(m.len(), 1);
        assert_eq!(m.cells().next().unwrap().value(), "2");
    }

    #[test]
    fn column_delete_replaces_put() {
        let mut m = Mutation::from(Put::new("r").add("f", "q", "1").add("f", "p", "2"));
        m.merge(Delete::new("r").delete_column("f", "q").into());
        assert_eq!(
            types(&m),
            vec![
                ("f:p".to_string(), CellType::Put),
                ("f:q".to_string(), CellType::DeleteColumn),
            ]
        );
    }

    #[test]
    fn put_replaces_column_delete() {
        let mut m = Mutation::from(Delete::new("r").delete_column("f", "q"));
        m.merge(Put::new("r").add("f", "q", "1").into());
        assert_eq!(types(&m), vec![("f:q".to_string(), CellType::Put)]);
    }

    #[test]
    fn family_delete_drops_family_then_later_puts_follow() {
        let mut m = Mutation::from(
            Put::new("r")
                .add("f", "a", "1")
                .add("f", "b", "2")
                .add("g", "a", "3"),
        );
        m.merge(Delete::new("r").delete_family("f").into());
        m.merge(Put::new("r").add("f", "c", "4").into());

        assert_eq!(
            types(&m),
            vec![
                ("f:".to_string(), CellType::DeleteFamily),
                ("f:c".to_string(), CellType::Put),
                ("g:a".to_string(), CellType::Put),
            ]
        );
    }

    #[test]
    fn cells_are_in_cell_order() {
        let m = Mutation::from(
            Put::new("r")
                .add("z", "a", "1")
                .add("b", "z", "2")
                .add("b", "a", "3"),
        );
        let cells = m.to_cells();
        let mut sorted = cells.clone();
        sorted.sort();
        assert_eq!(cells, sorted);
    }

    #[test]
    fn builders_report_families() {
        let m = Mutation::from(Put::new("r").add_all("data", [("a", "1"), ("b", "2")]));
        assert!(m.touches_family(b"data"));
        assert!(!m.touches_family(b"meta"));
        assert!(Delete::new("r").is_empty());
        assert!(Put::new("r").is_empty());
    }
}
