use serde::{Deserialize, Serialize};

/// The logical column slots a block currently occupies within the table's
/// column axis, in block-storage order. Bookkeeping only: global
/// disjointness and coverage are the collection's invariants to enforce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPlacement {
    slots: Vec<usize>,
}

impl ColumnPlacement {
    #[must_use]
    pub fn new(slots: Vec<usize>) -> Self {
        Self { slots }
    }

    #[must_use]
    pub fn single(slot: usize) -> Self {
        Self { slots: vec![slot] }
    }

    #[must_use]
    pub fn from_range(range: std::ops::Range<usize>) -> Self {
        Self {
            slots: range.collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.slots
    }

    /// Storage offset of the given logical slot, if this placement holds it.
    #[must_use]
    pub fn offset_of(&self, slot: usize) -> Option<usize> {
        self.slots.iter().position(|&s| s == slot)
    }

    /// Consecutive ascending slots (the cheap case for splitting).
    #[must_use]
    pub fn is_slice_like(&self) -> bool {
        self.slots.windows(2).all(|w| w[1] == w[0] + 1)
    }

    /// Reindex the placement itself: pick entries by storage offset.
    #[must_use]
    pub fn take(&self, offsets: &[usize]) -> Self {
        Self {
            slots: offsets.iter().map(|&o| self.slots[o]).collect(),
        }
    }

    pub fn push(&mut self, slot: usize) {
        self.slots.push(slot);
    }

    /// Move every slot right by `delta` (column-set concatenation).
    pub fn shift_all(&mut self, delta: usize) {
        for slot in &mut self.slots {
            *slot += delta;
        }
    }

    /// Shift bookkeeping after a column-axis insert at `position`: every
    /// slot at or beyond it moves one to the right.
    pub fn increment_from(&mut self, position: usize) {
        for slot in &mut self.slots {
            if *slot >= position {
                *slot += 1;
            }
        }
    }

    /// Shift bookkeeping after column-axis deletions: each slot decreases
    /// by the number of removed positions below it. `removed` must be
    /// sorted ascending and disjoint from this placement.
    pub fn collapse_removed(&mut self, removed: &[usize]) {
        for slot in &mut self.slots {
            let below = removed.partition_point(|&r| r < *slot);
            *slot -= below;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnPlacement;

    #[test]
    fn range_placement_is_slice_like() {
        let placement = ColumnPlacement::from_range(2..5);
        assert_eq!(placement.indices(), &[2, 3, 4]);
        assert!(placement.is_slice_like());
        assert_eq!(placement.offset_of(3), Some(1));
        assert_eq!(placement.offset_of(9), None);
    }

    #[test]
    fn reordered_placement_is_not_slice_like() {
        let placement = ColumnPlacement::new(vec![4, 1, 2]);
        assert!(!placement.is_slice_like());
    }

    #[test]
    fn take_reindexes_by_storage_offset() {
        let placement = ColumnPlacement::new(vec![5, 0, 3]);
        let taken = placement.take(&[2, 0]);
        assert_eq!(taken.indices(), &[3, 5]);
    }

    #[test]
    fn increment_from_shifts_tail_slots() {
        let mut placement = ColumnPlacement::new(vec![0, 2, 4]);
        placement.increment_from(2);
        assert_eq!(placement.indices(), &[0, 3, 5]);
    }

    #[test]
    fn collapse_removed_accounts_for_holes_below() {
        let mut placement = ColumnPlacement::new(vec![1, 4, 6]);
        placement.collapse_removed(&[0, 3, 5]);
        assert_eq!(placement.indices(), &[0, 2, 3]);
    }
}
