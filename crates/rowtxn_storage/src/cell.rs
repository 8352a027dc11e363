//! The cell (key-value) model shared by the store and the transaction layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Type of a cell.
///
/// Codes match the store's numeric type codes. Within one column the cell
/// order sorts higher codes first, so deletes are seen before the puts they
/// shadow. `Minimum` and `Maximum` are search sentinels and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CellType {
    /// Lowest sentinel.
    Minimum = 0,
    /// A value.
    Put = 4,
    /// Deletes one column.
    Delete = 8,
    /// Deletes every column of a family.
    DeleteFamilyVersion = 10,
    /// Deletes one column.
    DeleteColumn = 12,
    /// Deletes every column of a family.
    DeleteFamily = 14,
    /// Highest sentinel.
    Maximum = 255,
}

impl CellType {
    /// All cell types in forward traversal order for one column.
    pub const TRAVERSAL_ORDER: [CellType; 7] = [
        Self::Maximum,
        Self::DeleteFamily,
        Self::DeleteColumn,
        Self::DeleteFamilyVersion,
        Self::Delete,
        Self::Put,
        Self::Minimum,
    ];

    /// Converts a type code to a cell type.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Minimum),
            4 => Some(Self::Put),
            8 => Some(Self::Delete),
            10 => Some(Self::DeleteFamilyVersion),
            12 => Some(Self::DeleteColumn),
            14 => Some(Self::DeleteFamily),
            255 => Some(Self::Maximum),
            _ => None,
        }
    }

    /// Returns the numeric type code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns true for every delete variant.
    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(
            self,
            Self::Delete | Self::DeleteColumn | Self::DeleteFamily | Self::DeleteFamilyVersion
        )
    }

    /// Returns true for deletes that apply to a whole family.
    #[must_use]
    pub const fn is_family_delete(self) -> bool {
        matches!(self, Self::DeleteFamily | Self::DeleteFamilyVersion)
    }

    /// Returns whether a delete of this type placed at `(family, qualifier)`
    /// removes the column `(other_family, other_qualifier)`.
    ///
    /// Column deletes match the exact qualifier, family deletes match every
    /// qualifier of the family. Non-delete types cover nothing.
    #[must_use]
    pub fn covers(
        self,
        family: &[u8],
        qualifier: Option<&[u8]>,
        other_family: &[u8],
        other_qualifier: Option<&[u8]>,
    ) -> bool {
        match self {
            Self::DeleteFamily | Self::DeleteFamilyVersion => family == other_family,
            Self::Delete | Self::DeleteColumn => {
                family == other_family && qualifier == other_qualifier
            }
            Self::Put | Self::Minimum | Self::Maximum => false,
        }
    }
}

/// A single cell: row, family, qualifier, value and type.
///
/// Cells carry no version. The store assigns physical versions when a cell is
/// written, so clients never control them. Cells are immutable once built.
///
/// The total order (`Ord`) is: row, family, qualifier ascending (an absent
/// qualifier sorts first), then type descending by code, then value. The
/// value tie-break only keeps the order total; [`Cell::cmp_key`] leaves it out.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    row: Bytes,
    family: Bytes,
    qualifier: Option<Bytes>,
    value: Bytes,
    cell_type: CellType,
}

impl Cell {
    /// Creates a cell.
    pub fn new(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: Option<Bytes>,
        value: impl Into<Bytes>,
        cell_type: CellType,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier,
            value: value.into(),
            cell_type,
        }
    }

    /// Creates a `Put` cell.
    pub fn put(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self::new(row, family, Some(qualifier.into()), value, CellType::Put)
    }

    /// Creates a `DeleteColumn` cell.
    pub fn delete_column(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
    ) -> Self {
        Self::new(
            row,
            family,
            Some(qualifier.into()),
            Bytes::new(),
            CellType::DeleteColumn,
        )
    }

    /// Creates a `DeleteFamily` cell.
    pub fn delete_family(row: impl Into<Bytes>, family: impl Into<Bytes>) -> Self {
        Self::new(row, family, None, Bytes::new(), CellType::DeleteFamily)
    }

    /// Creates a search probe that sorts before every real cell of the column.
    pub fn first_on_column(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
    ) -> Self {
        Self::new(
            row,
            family,
            Some(qualifier.into()),
            Bytes::new(),
            CellType::Maximum,
        )
    }

    /// Returns the row key.
    #[must_use]
    pub fn row(&self) -> &Bytes {
        &self.row
    }

    /// Returns the column family.
    #[must_use]
    pub fn family(&self) -> &Bytes {
        &self.family
    }

    /// Returns the qualifier, if any.
    #[must_use]
    pub fn qualifier(&self) -> Option<&Bytes> {
        self.qualifier.as_ref()
    }

    /// Returns the value. Empty for deletes.
    #[must_use]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Returns the cell type.
    #[must_use]
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Returns true if this cell is in the given column.
    #[must_use]
    pub fn matching_column(&self, family: &[u8], qualifier: &[u8]) -> bool {
        self.family.as_ref() == family && self.qualifier.as_deref() == Some(qualifier)
    }

    /// Returns true if this cell is a delete that removes `other`.
    #[must_use]
    pub fn covers(&self, other: &Cell) -> bool {
        self.row == other.row
            && self.cell_type.covers(
                &self.family,
                self.qualifier.as_deref(),
                &other.family,
                other.qualifier.as_deref(),
            )
    }

    /// Compares two cells without looking at their values.
    ///
    /// This is the order used to merge cell sequences: two cells that only
    /// differ by value address the same logical slot.
    #[must_use]
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.family.cmp(&other.family))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
            .then_with(|| other.cell_type.code().cmp(&self.cell_type.code()))
    }

    /// Exact reverse of the cell order.
    #[must_use]
    pub fn cmp_reverse(&self, other: &Self) -> Ordering {
        other.cmp(self)
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("row", &escape_bytes(&self.row))
            .field("family", &escape_bytes(&self.family))
            .field(
                "qualifier",
                &self.qualifier.as_deref().map(escape_bytes),
            )
            .field("value", &escape_bytes(&self.value))
            .field("type", &self.cell_type)
            .finish()
    }
}

/// Renders bytes as printable ASCII, escaping everything else.
#[must_use]
pub fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}
