#![forbid(unsafe_code)]

//! Shared fixtures and invariant checks for the cross-crate test suites.

use fb_block::registry::ColumnArray;
use fb_index::AxisIndex;
use fb_manager::BlockCollection;

/// A small mixed-kind table: two int columns, one float, one object.
#[must_use]
pub fn mixed_fixture() -> BlockCollection {
    BlockCollection::from_columns(
        vec![
            ("ints".into(), ColumnArray::Int64(vec![1, 2, 3])),
            ("floats".into(), ColumnArray::Float64(vec![0.5, 1.5, 2.5])),
            ("more_ints".into(), ColumnArray::Int64(vec![10, 20, 30])),
            (
                "text".into(),
                ColumnArray::Utf8(vec![Some("a".to_owned()), None, Some("c".to_owned())]),
            ),
        ],
        AxisIndex::from_range(0, 3),
    )
    .expect("fixture builds")
}

/// Independent statement of the coverage invariant: the union of every
/// buffer's placement slots is exactly `0..ncols`, each slot once.
pub fn assert_coverage(collection: &BlockCollection) {
    let ncols = collection.ncols();
    let mut seen = vec![0_usize; ncols];
    for block in collection.blocks() {
        assert_eq!(
            block.width(),
            block.placement().len(),
            "buffer width must equal its placement size"
        );
        for &slot in block.placement().indices() {
            assert!(slot < ncols, "slot {slot} exceeds column count {ncols}");
            seen[slot] += 1;
        }
    }
    for (slot, count) in seen.iter().enumerate() {
        assert_eq!(*count, 1, "column slot {slot} covered {count} times");
    }
}
