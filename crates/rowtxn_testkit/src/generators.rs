//! Property-based test generators using proptest.
//!
//! Families and qualifiers are drawn from small alphabets so that generated
//! cells collide on the same columns often enough to exercise merge
//! precedence.

use bytes::Bytes;
use proptest::prelude::*;
use rowtxn_storage::{Cell, CellType};

/// Row key used by generated single-row data.
pub const TEST_ROW: &[u8] = b"row";

/// Strategy for generating row keys.
pub fn row_key_strategy() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..8).prop_map(Bytes::from)
}

/// Strategy for generating column families.
pub fn family_strategy() -> impl Strategy<Value = Bytes> {
    prop::sample::select(vec!["a", "b"]).prop_map(Bytes::from)
}

/// Strategy for generating column qualifiers.
pub fn qualifier_strategy() -> impl Strategy<Value = Bytes> {
    prop::sample::select(vec!["x", "y", "z"]).prop_map(Bytes::from)
}

/// Strategy for generating cell values.
pub fn value_strategy() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..4).prop_map(Bytes::from)
}

/// Strategy for generating the storable cell types.
pub fn cell_type_strategy() -> impl Strategy<Value = CellType> {
    prop_oneof![
        4 => Just(CellType::Put),
        1 => Just(CellType::DeleteColumn),
        1 => Just(CellType::DeleteFamily),
    ]
}

/// Strategy for generating one cell of [`TEST_ROW`].
pub fn cell_strategy() -> impl Strategy<Value = Cell> {
    (
        family_strategy(),
        qualifier_strategy(),
        value_strategy(),
        cell_type_strategy(),
    )
        .prop_map(|(family, qualifier, value, cell_type)| match cell_type {
            CellType::DeleteFamily => Cell::delete_family(TEST_ROW, family),
            CellType::DeleteColumn => Cell::delete_column(TEST_ROW, family, qualifier),
            _ => Cell::put(TEST_ROW, family, qualifier, value),
        })
}

/// Strategy for generating the sorted cells of one source.
pub fn sorted_cells_strategy() -> impl Strategy<Value = Vec<Cell>> {
    prop::collection::vec(cell_strategy(), 0..12).prop_map(|mut cells| {
        cells.sort();
        cells
    })
}

/// Strategy for generating put cells across several rows.
pub fn put_cells_strategy() -> impl Strategy<Value = Vec<Cell>> {
    prop::collection::vec(
        (
            row_key_strategy(),
            family_strategy(),
            qualifier_strategy(),
            value_strategy(),
        )
            .prop_map(|(row, family, qualifier, value)| Cell::put(row, family, qualifier, value)),
        0..24,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::test_runner::TestRunner;

    #[test]
    fn sorted_cells_are_sorted() {
        let mut runner = TestRunner::default();
        runner
            .run(&sorted_cells_strategy(), |cells| {
                prop_assert!(cells.windows(2).all(|w| w[0] <= w[1]));
                prop_assert!(cells.iter().all(|c| c.row().as_ref() == TEST_ROW));
                Ok(())
            })
            .unwrap();
    }
}
