//! Column selections and row ranges for reads.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Which qualifiers of a family a read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FamilySelection {
    All,
    Qualifiers(BTreeSet<Bytes>),
    Range(Bound<Bytes>, Bound<Bytes>),
}

/// Columns requested by a get or scan.
///
/// An empty selection means every column of the row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    families: BTreeMap<Bytes, FamilySelection>,
}

impl ColumnSelection {
    /// Selects every column.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a whole family.
    #[must_use]
    pub fn add_family(mut self, family: impl Into<Bytes>) -> Self {
        self.families.insert(family.into(), FamilySelection::All);
        self
    }

    /// Adds a single column.
    ///
    /// Has no effect if the whole family is already selected.
    #[must_use]
    pub fn add_column(mut self, family: impl Into<Bytes>, qualifier: impl Into<Bytes>) -> Self {
        let qualifier = qualifier.into();
        let entry = self
            .families
            .entry(family.into())
            .or_insert_with(|| FamilySelection::Qualifiers(BTreeSet::new()));
        match entry {
            FamilySelection::All => {}
            FamilySelection::Qualifiers(set) => {
                set.insert(qualifier);
            }
            // A range widened by a point is no longer a range.
            FamilySelection::Range(..) => *entry = FamilySelection::All,
        }
        self
    }

    /// Selects the qualifiers of `family` that fall inside the bounds.
    #[must_use]
    pub fn add_qualifier_range(
        mut self,
        family: impl Into<Bytes>,
        start: Bound<Bytes>,
        end: Bound<Bytes>,
    ) -> Self {
        self.families
            .insert(family.into(), FamilySelection::Range(start, end));
        self
    }

    /// Returns true if every column is selected.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.families.is_empty()
    }

    /// Returns the selection widened with one extra column.
    ///
    /// Selecting everything already includes the column.
    #[must_use]
    pub fn including(&self, family: &[u8], qualifier: &[u8]) -> Self {
        if self.is_all() {
            return self.clone();
        }
        self.clone().add_column(
            Bytes::copy_from_slice(family),
            Bytes::copy_from_slice(qualifier),
        )
    }

    /// Returns true if `(family, qualifier)` is selected.
    #[must_use]
    pub fn matches(&self, family: &[u8], qualifier: &[u8]) -> bool {
        if self.is_all() {
            return true;
        }
        match self.families.get(family) {
            None => false,
            Some(FamilySelection::All) => true,
            Some(FamilySelection::Qualifiers(set)) => set.contains(qualifier),
            Some(FamilySelection::Range(start, end)) => {
                let above = match start {
                    Bound::Included(s) => qualifier >= &s[..],
                    Bound::Excluded(s) => qualifier > &s[..],
                    Bound::Unbounded => true,
                };
                let below = match end {
                    Bound::Included(e) => qualifier <= &e[..],
                    Bound::Excluded(e) => qualifier < &e[..],
                    Bound::Unbounded => true,
                };
                above && below
            }
        }
    }
}

/// A range of row keys: `start` inclusive, `stop` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRange {
    start: Option<Bytes>,
    stop: Option<Bytes>,
}

impl RowRange {
    /// Every row of the table.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Rows in `[start, stop)`, where a missing bound is open.
    #[must_use]
    pub fn new(start: Option<Bytes>, stop: Option<Bytes>) -> Self {
        Self { start, stop }
    }

    /// Rows in `[start, stop)`.
    pub fn between(start: impl Into<Bytes>, stop: impl Into<Bytes>) -> Self {
        Self {
            start: Some(start.into()),
            stop: Some(stop.into()),
        }
    }

    /// Rows from `start` (inclusive) to the end of the table.
    pub fn starting_at(start: impl Into<Bytes>) -> Self {
        Self {
            start: Some(start.into()),
            stop: None,
        }
    }

    /// Returns the inclusive start key.
    #[must_use]
    pub fn start(&self) -> Option<&Bytes> {
        self.start.as_ref()
    }

    /// Returns the exclusive stop key.
    #[must_use]
    pub fn stop(&self) -> Option<&Bytes> {
        self.stop.as_ref()
    }

    /// Returns true if `row` is in range.
    #[must_use]
    pub fn contains(&self, row: &[u8]) -> bool {
        self.start.as_ref().map_or(true, |s| row >= &s[..])
            && self.stop.as_ref().map_or(true, |s| row < &s[..])
    }

    /// Returns the range as map bounds.
    #[must_use]
    pub fn bounds(&self) -> (Bound<Bytes>, Bound<Bytes>) {
        let start = self
            .start
            .clone()
            .map_or(Bound::Unbounded, Bound::Included);
        let stop = self.stop.clone().map_or(Bound::Unbounded, Bound::Excluded);
        (start, stop)
    }

    /// Returns the part of this range strictly after `row`.
    ///
    /// The smallest key above `row` is `row` followed by a zero byte.
    #[must_use]
    pub fn after(&self, row: &[u8]) -> Self {
        let mut start = Vec::with_capacity(row.len() + 1);
        start.extend_from_slice(row);
        start.push(0);
        Self {
            start: Some(Bytes::from(start)),
            stop: self.stop.clone(),
        }
    }
}
