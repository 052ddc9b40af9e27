//! Property-based suite for the block store. Strategy generators produce
//! arbitrary but valid column sets and mutation sequences; properties
//! assert the structural invariants that must hold for ALL inputs, not
//! just hand-picked fixtures.

use proptest::prelude::*;

use fb_block::registry::ColumnArray;
use fb_conformance::assert_coverage;
use fb_index::{AxisIndex, Label};
use fb_manager::{Axis, BlockCollection};
use fb_types::{CastPolicy, Kind, NullKind, Scalar};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

/// Column labels from a deliberately small space so duplicates occur.
fn arb_label() -> impl Strategy<Value = Label> {
    prop_oneof![
        3 => "[a-d]".prop_map(Label::Utf8),
        1 => (0_i64..4).prop_map(Label::Int64),
    ]
}

/// Finite floats only: raw NaN payloads do not survive JSON, and missing
/// entries are injected explicitly through `Mixed` columns instead.
fn arb_column(rows: usize) -> impl Strategy<Value = ColumnArray> {
    prop_oneof![
        3 => proptest::collection::vec(-1_000_i64..1_000, rows).prop_map(ColumnArray::Int64),
        3 => proptest::collection::vec(-1e6_f64..1e6, rows).prop_map(ColumnArray::Float64),
        2 => proptest::collection::vec(any::<bool>(), rows).prop_map(ColumnArray::Bool),
        2 => proptest::collection::vec(proptest::option::of("[a-z]{1,4}"), rows)
            .prop_map(ColumnArray::Utf8),
        1 => proptest::collection::vec(-1_000_000_i64..1_000_000, rows)
            .prop_map(ColumnArray::DateTime),
        1 => proptest::collection::vec(
            prop_oneof![
                4 => (-100_i64..100).prop_map(Scalar::Int64),
                1 => Just(Scalar::Null(NullKind::Null)),
            ],
            rows,
        )
        .prop_map(ColumnArray::Mixed),
    ]
}

fn arb_collection(max_cols: usize, max_rows: usize) -> impl Strategy<Value = BlockCollection> {
    (1..=max_rows, 1..=max_cols).prop_flat_map(|(rows, cols)| {
        let columns = proptest::collection::vec(
            (arb_label(), arb_column(rows)),
            cols,
        );
        columns.prop_map(move |columns| {
            BlockCollection::from_columns(columns, AxisIndex::from_range(0, rows as i64))
                .expect("generated collections are well-shaped")
        })
    })
}

/// One structural mutation, parameterized by value seeds resolved against
/// the collection's current shape at application time.
#[derive(Debug, Clone)]
enum Mutation {
    Insert { label: Label, position_seed: usize },
    Delete { position_seed: usize },
    Set { position_seed: usize },
    Consolidate,
}

fn arb_mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        3 => (arb_label(), 0_usize..8).prop_map(|(label, position_seed)| Mutation::Insert {
            label,
            position_seed,
        }),
        2 => (0_usize..8).prop_map(|position_seed| Mutation::Delete { position_seed }),
        3 => (0_usize..8).prop_map(|position_seed| Mutation::Set { position_seed }),
        1 => Just(Mutation::Consolidate),
    ]
}

fn apply_mutation(collection: &mut BlockCollection, mutation: &Mutation) {
    let rows = collection.nrows();
    match mutation {
        Mutation::Insert {
            label,
            position_seed,
        } => {
            let position = position_seed % (collection.ncols() + 1);
            collection
                .insert(
                    position,
                    label.clone(),
                    ColumnArray::Int64(vec![position as i64; rows]),
                    true,
                )
                .expect("in-range insert succeeds");
        }
        Mutation::Delete { position_seed } => {
            if collection.ncols() == 0 {
                return;
            }
            let position = position_seed % collection.ncols();
            let label = collection.col_axis().labels()[position].clone();
            collection.delete(&label).expect("existing label deletes");
        }
        Mutation::Set { position_seed } => {
            if collection.ncols() == 0 {
                return;
            }
            let position = position_seed % collection.ncols();
            let label = collection.col_axis().labels()[position].clone();
            collection
                .set_column(&label, ColumnArray::Float64(vec![0.25; rows]))
                .expect("assignment succeeds");
        }
        Mutation::Consolidate => {
            collection
                .consolidate_in_place()
                .expect("consolidation succeeds");
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Construction always satisfies the coverage invariant.
    #[test]
    fn prop_construction_covers_columns(collection in arb_collection(6, 8)) {
        assert_coverage(&collection);
        collection.verify_integrity().expect("fresh collections are intact");
    }

    /// Any mutation sequence preserves the coverage invariant and the
    /// axis/buffer agreement.
    #[test]
    fn prop_mutations_preserve_integrity(
        mut collection in arb_collection(4, 6),
        mutations in proptest::collection::vec(arb_mutation(), 1..12),
    ) {
        for mutation in &mutations {
            apply_mutation(&mut collection, mutation);
            assert_coverage(&collection);
            collection.verify_integrity().expect("invariants survive mutation");
        }
    }

    /// Identity take along either axis reproduces the collection.
    #[test]
    fn prop_identity_take_round_trips(collection in arb_collection(5, 7)) {
        let rows: Vec<usize> = (0..collection.nrows()).collect();
        let cols: Vec<usize> = (0..collection.ncols()).collect();
        prop_assert!(collection.take(&rows, Axis::Rows).expect("rows").equals(&collection));
        prop_assert!(collection.take(&cols, Axis::Columns).expect("cols").equals(&collection));
    }

    /// Consolidation never changes observable content and is idempotent.
    #[test]
    fn prop_consolidate_preserves_content(collection in arb_collection(6, 6)) {
        let once = collection.consolidate().expect("consolidate");
        prop_assert!(once.equals(&collection));
        assert_coverage(&once);

        let twice = once.consolidate().expect("consolidate again");
        let partition = |c: &BlockCollection| -> Vec<(Kind, Vec<usize>)> {
            c.blocks()
                .iter()
                .map(|b| (b.kind(), b.placement().indices().to_vec()))
                .collect()
        };
        prop_assert_eq!(partition(&once), partition(&twice));
    }

    /// After consolidation every consolidatable kind owns at most one buffer.
    #[test]
    fn prop_consolidated_kind_buffer_bijection(collection in arb_collection(6, 6)) {
        let consolidated = collection.consolidate().expect("consolidate");
        let mut seen = std::collections::BTreeMap::new();
        for block in consolidated.blocks() {
            if block.kind().can_consolidate() {
                *seen.entry(block.kind()).or_insert(0) += 1;
            }
        }
        for (kind, count) in seen {
            prop_assert_eq!(count, 1, "kind {:?} owns {} buffers", kind, count);
        }
    }

    /// The serde round trip reproduces axes, kinds and values exactly.
    #[test]
    fn prop_serde_round_trip(collection in arb_collection(5, 6)) {
        let json = serde_json::to_string(&collection).expect("serialize");
        let back: BlockCollection = serde_json::from_str(&json).expect("deserialize");
        prop_assert!(back.equals(&collection));
        assert_coverage(&back);
    }

    /// Casting everything to object is total and preserves row count.
    #[test]
    fn prop_object_cast_is_total(collection in arb_collection(5, 6)) {
        let boxed = collection.astype(Kind::Object, CastPolicy::Strict).expect("boxing");
        prop_assert_eq!(boxed.ncols(), collection.ncols());
        prop_assert_eq!(boxed.nrows(), collection.nrows());
        for position in 0..boxed.ncols() {
            prop_assert_eq!(boxed.column_kind(position), Kind::Object);
            let left = boxed.column_scalars(position);
            let right = collection.column_scalars(position);
            for (a, b) in left.iter().zip(right.iter()) {
                prop_assert!(a.semantic_eq(b), "boxing must not change values");
            }
        }
    }

    /// Reindexing onto the same row axis is an identity, copy or not.
    #[test]
    fn prop_reindex_identity(collection in arb_collection(5, 6)) {
        let same = collection
            .reindex_axis(&collection.row_axis().clone(), Axis::Rows, None, false)
            .expect("reindex");
        prop_assert!(same.equals(&collection));
        let deep = collection
            .reindex_axis(&collection.row_axis().clone(), Axis::Rows, None, true)
            .expect("reindex");
        prop_assert!(deep.equals(&collection));
    }

    /// Reindexing rows onto a superset introduces missing entries only at
    /// the new labels.
    #[test]
    fn prop_reindex_superset_fills_holes(collection in arb_collection(4, 5)) {
        let rows = collection.nrows() as i64;
        let target = AxisIndex::from_range(0, rows + 2);
        let out = collection
            .reindex_axis(&target, Axis::Rows, None, false)
            .expect("reindex");
        assert_coverage(&out);
        for position in 0..out.ncols() {
            let values = out.column_scalars(position);
            prop_assert!(values[rows as usize].is_missing());
            prop_assert!(values[rows as usize + 1].is_missing());
            let original = collection.column_kind(position);
            let widened = out.column_kind(position);
            // Narrow kinds widen; NA-capable kinds are unchanged.
            if original.can_hold_na() {
                prop_assert_eq!(widened, original);
            }
        }
    }
}
