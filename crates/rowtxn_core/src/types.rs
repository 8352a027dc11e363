//! Core type definitions for rowtxn.

use bytes::Bytes;
use rowtxn_storage::escape_bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a transaction.
///
/// A transaction id is the timestamp drawn when the transaction prewrites,
/// so it orders after every commit the transaction observed. `0` means
/// "no transaction".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// The id carried by locks no transaction owns.
    pub const NONE: Self = Self(0);

    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<Timestamp> for TransactionId {
    fn from(ts: Timestamp) -> Self {
        Self(ts.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// A point on the transaction clock.
///
/// Commit timestamps strictly increase for any one row.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The timestamp of a row no transaction has committed.
    pub const ZERO: Self = Self(0);

    /// Creates a new timestamp.
    #[must_use]
    pub const fn new(ts: u64) -> Self {
        Self(ts)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}

/// Address of one row: table name plus row key.
///
/// Ordered by table, then row key. This is the order in which a
/// transaction locks its secondary rows.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowRef {
    table: String,
    row: Bytes,
}

impl RowRef {
    /// Creates a row reference.
    pub fn new(table: impl Into<String>, row: impl Into<Bytes>) -> Self {
        Self {
            table: table.into(),
            row: row.into(),
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the row key.
    #[must_use]
    pub fn row(&self) -> &Bytes {
        &self.row
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, escape_bytes(&self.row))
    }
}

impl fmt::Debug for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowRef({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
        assert_eq!(TransactionId::from(Timestamp::new(9)).as_u64(), 9);
    }

    #[test]
    fn row_refs_order_by_table_then_row() {
        let mut rows = vec![
            RowRef::new("b", "a"),
            RowRef::new("a", "z"),
            RowRef::new("a", "b"),
        ];
        rows.sort();
        assert_eq!(
            rows,
            vec![
                RowRef::new("a", "b"),
                RowRef::new("a", "z"),
                RowRef::new("b", "a"),
            ]
        );
    }

    #[test]
    fn row_ref_display_escapes_bytes() {
        let row = RowRef::new("t", Bytes::from_static(b"k\x01"));
        assert_eq!(format!("{row}"), "t/k\\x01");
        assert_eq!(format!("{}", Timestamp::new(4)), "ts:4");
    }
}
