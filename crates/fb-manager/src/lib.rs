#![forbid(unsafe_code)]

use std::cell::OnceCell;
use std::collections::BTreeMap;

use fb_block::registry::{self, ColumnArray, RawBlock};
use fb_block::{Block, BlockError, ColumnPlacement};
use fb_index::{AxisIndex, Label};
use fb_types::{CastPolicy, Kind, Scalar, TypeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Columns,
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("label '{0}' not found in axis")]
    MissingLabel(Label),
    #[error("label '{0}' already exists and duplicates were not allowed")]
    DuplicateLabel(Label),
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("position {index} out of bounds for axis of length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("axes differ; align before combining")]
    AxisMismatch,
    #[error("internal integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result of a label lookup on the column axis: a unique label resolves to
/// the owning buffer's single-column slice; a duplicated label yields a
/// sub-collection holding every match, itself a valid collection.
#[derive(Debug)]
pub enum ColumnSelection {
    Single(Block),
    Multiple(BlockCollection),
}

/// The typed-block store of one table: an ordered set of kind-homogeneous
/// buffers whose placements partition the column axis, plus the shared
/// row- and column-label sequences. Every structural mutation funnels
/// through here.
#[derive(Debug, Clone)]
pub struct BlockCollection {
    row_axis: AxisIndex,
    col_axis: AxisIndex,
    blocks: Vec<Block>,
    consolidated: bool,
    locator: OnceCell<Vec<(usize, usize)>>,
}

impl BlockCollection {
    // ── construction ───────────────────────────────────────────────────

    pub fn from_columns(
        columns: Vec<(Label, ColumnArray)>,
        row_axis: AxisIndex,
    ) -> Result<Self, CollectionError> {
        for (_, array) in &columns {
            if array.len() != row_axis.len() {
                return Err(CollectionError::ShapeMismatch {
                    expected: row_axis.len(),
                    found: array.len(),
                });
            }
        }
        let (labels, arrays): (Vec<Label>, Vec<ColumnArray>) = columns.into_iter().unzip();
        let blocks = registry::form_blocks(arrays)?;
        Self::from_blocks(blocks, row_axis, AxisIndex::new(labels))
    }

    pub fn from_blocks(
        blocks: Vec<Block>,
        row_axis: AxisIndex,
        col_axis: AxisIndex,
    ) -> Result<Self, CollectionError> {
        let out = Self {
            row_axis,
            col_axis,
            blocks,
            consolidated: false,
            locator: OnceCell::new(),
        };
        out.verify_integrity()?;
        Ok(out)
    }

    /// Check the structural invariants: placements partition the column
    /// axis exactly, and every buffer spans the row axis. A violation is a
    /// bug in the manager, not a user error, so it is never repaired here.
    pub fn verify_integrity(&self) -> Result<(), CollectionError> {
        let ncols = self.col_axis.len();
        let total_width: usize = self.blocks.iter().map(Block::width).sum();
        if total_width != ncols {
            return Err(CollectionError::Integrity(format!(
                "buffer widths sum to {total_width} but the column axis has {ncols} labels"
            )));
        }

        let mut coverage = vec![false; ncols];
        for block in &self.blocks {
            for &slot in block.placement().indices() {
                if slot >= ncols {
                    return Err(CollectionError::Integrity(format!(
                        "placement slot {slot} exceeds column axis length {ncols}"
                    )));
                }
                if coverage[slot] {
                    return Err(CollectionError::Integrity(format!(
                        "column slot {slot} is claimed by two buffers"
                    )));
                }
                coverage[slot] = true;
            }
            if block.rows() != self.row_axis.len() {
                return Err(CollectionError::Integrity(format!(
                    "buffer of {} rows attached to a row axis of {}",
                    block.rows(),
                    self.row_axis.len()
                )));
            }
        }
        Ok(())
    }

    // ── introspection ──────────────────────────────────────────────────

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.row_axis.len()
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.col_axis.len()
    }

    #[must_use]
    pub fn row_axis(&self) -> &AxisIndex {
        &self.row_axis
    }

    #[must_use]
    pub fn col_axis(&self) -> &AxisIndex {
        &self.col_axis
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn is_consolidated(&self) -> bool {
        self.consolidated
    }

    /// Lazily rebuilt map from column position to (buffer, offset); the
    /// incremental ref-loc patching this replaces was the hardest part of
    /// the original to audit, so it is recomputed in one obvious place.
    fn locator(&self) -> &[(usize, usize)] {
        self.locator.get_or_init(|| {
            let mut map = vec![(usize::MAX, usize::MAX); self.col_axis.len()];
            for (block_idx, block) in self.blocks.iter().enumerate() {
                for (offset, &slot) in block.placement().indices().iter().enumerate() {
                    map[slot] = (block_idx, offset);
                }
            }
            map
        })
    }

    fn invalidate(&mut self) {
        self.locator = OnceCell::new();
        self.consolidated = false;
    }

    #[must_use]
    pub fn column_kind(&self, position: usize) -> Kind {
        let (block_idx, _) = self.locator()[position];
        self.blocks[block_idx].kind()
    }

    #[must_use]
    pub fn column_scalars(&self, position: usize) -> Vec<Scalar> {
        let (block_idx, offset) = self.locator()[position];
        self.blocks[block_idx].column_scalars(offset)
    }

    /// Per-column kind histogram.
    #[must_use]
    pub fn dtype_counts(&self) -> BTreeMap<Kind, usize> {
        let mut counts = BTreeMap::new();
        for block in &self.blocks {
            *counts.entry(block.kind()).or_insert(0) += block.width();
        }
        counts
    }

    #[must_use]
    pub fn is_mixed_type(&self) -> bool {
        self.dtype_counts().len() > 1
    }

    /// Homogeneous external representation: every value boxed as a scalar,
    /// row-major. Used by whole-table reductions outside this layer.
    #[must_use]
    pub fn as_object_rows(&self) -> Vec<Vec<Scalar>> {
        let columns: Vec<Vec<Scalar>> =
            (0..self.ncols()).map(|pos| self.column_scalars(pos)).collect();
        (0..self.nrows())
            .map(|row| columns.iter().map(|col| col[row].clone()).collect())
            .collect()
    }

    /// Semantic equality: same axes, same per-column kinds and values.
    /// Deliberately independent of buffer partitioning, so a consolidated
    /// collection equals its unconsolidated source.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        if !self.row_axis.equals(&other.row_axis) || !self.col_axis.equals(&other.col_axis) {
            return false;
        }
        (0..self.ncols()).all(|pos| {
            self.column_kind(pos) == other.column_kind(pos)
                && self
                    .column_scalars(pos)
                    .iter()
                    .zip(other.column_scalars(pos).iter())
                    .all(|(a, b)| a.semantic_eq(b))
        })
    }

    /// `deep` materializes fresh storage for every buffer (through the
    /// factory, like deserialization); a shallow copy shares storage and
    /// is only safe for reading.
    pub fn copy(&self, deep: bool) -> Result<Self, CollectionError> {
        if !deep {
            return Ok(self.clone());
        }
        let blocks = self
            .blocks
            .iter()
            .map(|b| Block::from_raw(b.to_raw()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Self::from_blocks(blocks, self.row_axis.clone(), self.col_axis.clone())?;
        out.consolidated = self.consolidated;
        Ok(out)
    }

    // ── column access ──────────────────────────────────────────────────

    pub fn get_column(&self, label: &Label) -> Result<ColumnSelection, CollectionError> {
        let positions = self.col_axis.positions_of(label);
        match positions.as_slice() {
            [] => Err(CollectionError::MissingLabel(label.clone())),
            [position] => {
                let (block_idx, offset) = self.locator()[*position];
                let column = self.blocks[block_idx]
                    .column_block(offset)?
                    .with_placement(ColumnPlacement::single(0))?;
                Ok(ColumnSelection::Single(column))
            }
            _ => Ok(ColumnSelection::Multiple(
                self.take(&positions, Axis::Columns)?,
            )),
        }
    }

    /// Two-path assignment: overwrite in place when the owning buffer can
    /// hold every value losslessly, otherwise replace the column with a
    /// freshly dispatched buffer. Appends when the label is new.
    pub fn set_column(&mut self, label: &Label, array: ColumnArray) -> Result<(), CollectionError> {
        if array.len() != self.nrows() {
            return Err(CollectionError::ShapeMismatch {
                expected: self.nrows(),
                found: array.len(),
            });
        }

        let positions = self.col_axis.positions_of(label);
        if positions.is_empty() {
            return self.insert(self.ncols(), label.clone(), array, true);
        }

        let scalars = array_to_scalars(&array)?;
        for position in positions {
            let (block_idx, offset) = self.locator()[position];
            let holdable = scalars
                .iter()
                .all(|value| self.blocks[block_idx].can_hold(value));
            if holdable {
                self.blocks[block_idx].set_column_scalars(offset, &scalars)?;
            } else {
                self.delete_positions(&[position])?;
                self.insert(position, label.clone(), array.clone(), true)?;
            }
        }
        Ok(())
    }

    /// Insert a new logical column at `position`. The buffer is built
    /// before the axis or any placement is touched, so a failed
    /// construction leaves the collection unchanged.
    pub fn insert(
        &mut self,
        position: usize,
        label: Label,
        array: ColumnArray,
        allow_duplicates: bool,
    ) -> Result<(), CollectionError> {
        if position > self.ncols() {
            return Err(CollectionError::OutOfBounds {
                index: position,
                len: self.ncols(),
            });
        }
        if array.len() != self.nrows() {
            return Err(CollectionError::ShapeMismatch {
                expected: self.nrows(),
                found: array.len(),
            });
        }
        if !allow_duplicates && self.col_axis.contains(&label) {
            return Err(CollectionError::DuplicateLabel(label));
        }

        let block = registry::make_block(array, position)?;

        for existing in &mut self.blocks {
            existing.placement_mut().increment_from(position);
        }
        self.col_axis = self.col_axis.insert(position, label);
        self.blocks.push(block);
        self.invalidate();
        Ok(())
    }

    /// Remove every column matching `label` (duplicate-aware).
    pub fn delete(&mut self, label: &Label) -> Result<(), CollectionError> {
        let positions = self.col_axis.positions_of(label);
        if positions.is_empty() {
            return Err(CollectionError::MissingLabel(label.clone()));
        }
        self.delete_positions(&positions)
    }

    /// Remove columns by position (sorted ascending). Buffers owning a
    /// removed column are split around it, keeping survivors as views
    /// where the surviving run is contiguous.
    pub fn delete_positions(&mut self, positions: &[usize]) -> Result<(), CollectionError> {
        for &position in positions {
            if position >= self.ncols() {
                return Err(CollectionError::OutOfBounds {
                    index: position,
                    len: self.ncols(),
                });
            }
        }

        let mut survivors = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let removed_offsets: Vec<usize> = block
                .placement()
                .indices()
                .iter()
                .enumerate()
                .filter_map(|(offset, slot)| positions.contains(slot).then_some(offset))
                .collect();
            if removed_offsets.is_empty() {
                survivors.push(block.clone());
            } else {
                survivors.extend(block.split_without_offsets(&removed_offsets));
            }
        }
        for block in &mut survivors {
            block.placement_mut().collapse_removed(positions);
        }

        self.blocks = survivors;
        self.col_axis = self.col_axis.delete(positions);
        self.invalidate();
        self.verify_integrity()
    }

    // ── gathering and reindexing ───────────────────────────────────────

    /// Positional gather along either axis; structure-preserving.
    pub fn take(&self, indexer: &[usize], axis: Axis) -> Result<Self, CollectionError> {
        match axis {
            Axis::Rows => {
                for &position in indexer {
                    if position >= self.nrows() {
                        return Err(CollectionError::OutOfBounds {
                            index: position,
                            len: self.nrows(),
                        });
                    }
                }
                let slots: Vec<Option<usize>> = indexer.iter().map(|&i| Some(i)).collect();
                let blocks = self
                    .blocks
                    .iter()
                    .map(|b| b.take_rows(&slots))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_blocks(blocks, self.row_axis.take(indexer), self.col_axis.clone())
            }
            Axis::Columns => {
                for &position in indexer {
                    if position >= self.ncols() {
                        return Err(CollectionError::OutOfBounds {
                            index: position,
                            len: self.ncols(),
                        });
                    }
                }
                let slots: Vec<Option<usize>> = indexer.iter().map(|&i| Some(i)).collect();
                let blocks = self.regroup_columns(&slots, None)?;
                Self::from_blocks(blocks, self.row_axis.clone(), self.col_axis.take(indexer))
            }
        }
    }

    /// Conform the collection to `new_axis` along `axis`. Existing labels
    /// keep their data (views where possible); labels absent from the
    /// source get synthesized fill buffers. With `copy` false and an
    /// unchanged axis, storage is shared rather than duplicated.
    pub fn reindex_axis(
        &self,
        new_axis: &AxisIndex,
        axis: Axis,
        fill_value: Option<&Scalar>,
        copy: bool,
    ) -> Result<Self, CollectionError> {
        let current = match axis {
            Axis::Rows => &self.row_axis,
            Axis::Columns => &self.col_axis,
        };
        if current.equals(new_axis) {
            return self.copy(copy);
        }

        match axis {
            Axis::Rows => {
                let indexer = self.row_axis.get_indexer(new_axis);
                let blocks = self
                    .blocks
                    .iter()
                    .map(|block| take_rows_with_fill(block, &indexer, fill_value))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_blocks(blocks, new_axis.clone(), self.col_axis.clone())
            }
            Axis::Columns => {
                let indexer = self.col_axis.get_indexer(new_axis);
                let blocks = self.regroup_columns(&indexer, fill_value)?;
                Self::from_blocks(blocks, self.row_axis.clone(), new_axis.clone())
            }
        }
    }

    /// Rebuild the buffer set for a new column arrangement. `indexer[j]`
    /// names the source position for target slot `j` (`None` synthesizes a
    /// fill buffer). Surviving columns stay grouped by their source buffer.
    fn regroup_columns(
        &self,
        indexer: &[Option<usize>],
        fill_value: Option<&Scalar>,
    ) -> Result<Vec<Block>, CollectionError> {
        struct Group {
            block_idx: usize,
            offsets: Vec<usize>,
            slots: Vec<usize>,
        }

        let mut groups: Vec<Group> = Vec::new();
        let mut fills: Vec<usize> = Vec::new();
        for (slot, source) in indexer.iter().enumerate() {
            match source {
                Some(position) => {
                    let (block_idx, offset) = self.locator()[*position];
                    match groups.iter_mut().find(|g| g.block_idx == block_idx) {
                        Some(group) => {
                            group.offsets.push(offset);
                            group.slots.push(slot);
                        }
                        None => groups.push(Group {
                            block_idx,
                            offsets: vec![offset],
                            slots: vec![slot],
                        }),
                    }
                }
                None => fills.push(slot),
            }
        }

        let mut blocks = Vec::with_capacity(groups.len() + fills.len());
        for group in groups {
            let gathered = self.blocks[group.block_idx]
                .take_columns(&group.offsets)?
                .with_placement(ColumnPlacement::new(group.slots))?;
            blocks.push(gathered);
        }

        let fill = fill_value.cloned().unwrap_or(Scalar::Null(fb_types::NullKind::NaN));
        let fill_kind = registry::kind_for_scalars(&[fill.clone()]);
        for slot in fills {
            blocks.push(registry::fill_block(fill_kind, self.nrows(), &fill, slot)?);
        }
        Ok(blocks)
    }

    /// Row window; single-column buffers stay views.
    #[must_use]
    pub fn slice_rows(&self, start: usize, len: usize) -> Self {
        let blocks = self.blocks.iter().map(|b| b.slice_rows(start, len)).collect();
        Self {
            row_axis: self.row_axis.slice(start, len),
            col_axis: self.col_axis.clone(),
            blocks,
            consolidated: self.consolidated,
            locator: OnceCell::new(),
        }
    }

    // ── consolidation ──────────────────────────────────────────────────

    /// Merge same-kind consolidatable buffers into one buffer per kind.
    /// Cheap when the cached flag says the work is already done.
    pub fn consolidate_in_place(&mut self) -> Result<(), CollectionError> {
        if self.consolidated {
            return Ok(());
        }

        let blocks = std::mem::take(&mut self.blocks);
        let mut grouped: Vec<(Kind, Vec<Block>)> = Vec::new();
        let mut singles: Vec<Block> = Vec::new();
        for block in blocks {
            if block.kind().can_consolidate() {
                match grouped.iter_mut().find(|(kind, _)| *kind == block.kind()) {
                    Some((_, group)) => group.push(block),
                    None => grouped.push((block.kind(), vec![block])),
                }
            } else {
                singles.push(block);
            }
        }

        let mut merged = Vec::with_capacity(grouped.len() + singles.len());
        for (_, group) in grouped {
            if group.len() == 1 {
                merged.extend(group);
            } else {
                let refs: Vec<&Block> = group.iter().collect();
                merged.push(Block::merge_same_kind(&refs)?);
            }
        }
        merged.extend(singles);

        self.blocks = merged;
        self.locator = OnceCell::new();
        self.consolidated = true;
        Ok(())
    }

    pub fn consolidate(&self) -> Result<Self, CollectionError> {
        let mut out = self.clone();
        out.consolidate_in_place()?;
        Ok(out)
    }

    // ── per-buffer application ─────────────────────────────────────────

    /// Map every buffer through `op` and reassemble. An op may return
    /// several buffers (split-on-promotion); the result is re-consolidated
    /// and integrity-checked.
    pub fn apply(
        &self,
        op: impl Fn(&Block) -> Result<Vec<Block>, BlockError>,
    ) -> Result<Self, CollectionError> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            blocks.extend(op(block)?);
        }
        let mut out = Self::from_blocks(blocks, self.row_axis.clone(), self.col_axis.clone())?;
        out.consolidate_in_place()?;
        Ok(out)
    }

    pub fn astype(&self, target: Kind, policy: CastPolicy) -> Result<Self, CollectionError> {
        self.apply(|block| block.astype(target, policy).map(|b| vec![b]))
    }

    pub fn fillna(&self, value: &Scalar) -> Result<Self, CollectionError> {
        self.apply(|block| block.fillna(value))
    }

    pub fn putmask(&self, mask: &[bool], value: &Scalar) -> Result<Self, CollectionError> {
        if mask.len() != self.nrows() {
            return Err(CollectionError::ShapeMismatch {
                expected: self.nrows(),
                found: mask.len(),
            });
        }
        self.apply(|block| block.putmask(mask, value))
    }

    pub fn shift(&self, periods: i64) -> Result<Self, CollectionError> {
        self.apply(|block| block.shift(periods).map(|b| vec![b]))
    }

    /// Best-effort inference on object buffers: columns whose values fit a
    /// narrower kind are rebuilt there; unconvertible columns are left
    /// unchanged rather than failing the whole pass.
    pub fn convert(&self) -> Result<Self, CollectionError> {
        self.apply(|block| {
            if block.kind() != Kind::Object {
                return Ok(vec![block.clone()]);
            }
            let mut out = Vec::with_capacity(block.width());
            for offset in 0..block.width() {
                let scalars = block.column_scalars(offset);
                let slot = block.placement().indices()[offset];
                let kind = registry::kind_for_scalars(&scalars);
                if kind == Kind::Object {
                    out.push(block.column_block(offset)?);
                } else {
                    out.push(registry::block_of_kind(
                        kind,
                        &[scalars],
                        ColumnPlacement::single(slot),
                    )?);
                }
            }
            Ok(out)
        })
    }

    // ── combination ────────────────────────────────────────────────────

    /// Concatenate the column sets of two collections sharing a row axis.
    /// Alignment of unequal axes belongs to the dispatch layer above.
    pub fn merge(&self, other: &Self) -> Result<Self, CollectionError> {
        if !self.row_axis.equals(&other.row_axis) {
            return Err(CollectionError::AxisMismatch);
        }

        let offset = self.ncols();
        let mut blocks = self.blocks.clone();
        for block in &other.blocks {
            let mut shifted = block.clone();
            shifted.placement_mut().shift_all(offset);
            blocks.push(shifted);
        }

        let mut labels = self.col_axis.labels().to_vec();
        labels.extend(other.col_axis.labels().iter().cloned());
        Self::from_blocks(blocks, self.row_axis.clone(), AxisIndex::new(labels))
    }

    /// Row-wise concatenation of two collections with identical column
    /// axes. Matching buffer structures concatenate kind-to-kind; mixed
    /// structures fall back to per-column rebuild under kind promotion.
    pub fn vstack(&self, other: &Self) -> Result<Self, CollectionError> {
        if !self.col_axis.equals(&other.col_axis) {
            return Err(CollectionError::AxisMismatch);
        }

        let mut labels = self.row_axis.labels().to_vec();
        labels.extend(other.row_axis.labels().iter().cloned());
        let row_axis = AxisIndex::new(labels);

        let left = self.consolidate()?;
        let right = other.consolidate()?;

        // Fast path: both sides partition the columns identically.
        let paired: Option<Vec<(&Block, &Block)>> = left
            .blocks
            .iter()
            .map(|a| {
                right
                    .blocks
                    .iter()
                    .find(|b| {
                        b.kind() == a.kind() && b.placement().indices() == a.placement().indices()
                    })
                    .map(|b| (a, b))
            })
            .collect();

        if let Some(pairs) = paired {
            let blocks = pairs
                .into_iter()
                .map(|(a, b)| Block::concat_same_kind(&[a, b]))
                .collect::<Result<Vec<_>, _>>()?;
            return Self::from_blocks(blocks, row_axis, self.col_axis.clone());
        }

        // Kind layouts differ: rebuild column-wise, promoting as needed.
        let columns = (0..self.ncols())
            .map(|pos| {
                let mut scalars = left.column_scalars(pos);
                scalars.extend(right.column_scalars(pos));
                (self.col_axis.labels()[pos].clone(), ColumnArray::Mixed(scalars))
            })
            .collect();
        Self::from_columns(columns, row_axis)
    }
}

/// Row gather with an explicit fill for holes, promoting the buffer first
/// when it cannot hold the fill value.
fn take_rows_with_fill(
    block: &Block,
    indexer: &[Option<usize>],
    fill_value: Option<&Scalar>,
) -> Result<Block, BlockError> {
    let Some(fill) = fill_value else {
        return block.take_rows(indexer);
    };
    if fill.is_missing() || !indexer.iter().any(Option::is_none) {
        return block.take_rows(indexer);
    }

    let source = if block.can_hold(fill) {
        block.clone()
    } else {
        block.astype(fb_types::promote_for_scalar(block.kind(), fill), CastPolicy::Strict)?
    };
    if source.rows() == 0 {
        // Nothing to gather from; every slot is a hole.
        return source.take_rows(indexer);
    }

    // Gather through a dummy source row so the holes do not force a
    // missing-marker promotion, then overwrite them with the fill value.
    let dummied: Vec<Option<usize>> = indexer.iter().map(|slot| Some(slot.unwrap_or(0))).collect();
    let taken = source.take_rows(&dummied)?;
    let mask: Vec<bool> = indexer.iter().map(Option::is_none).collect();
    let mut filled = taken.putmask(&mask, fill)?;
    debug_assert_eq!(filled.len(), 1, "holdable fill never splits");
    Ok(filled.remove(0))
}

fn array_to_scalars(array: &ColumnArray) -> Result<Vec<Scalar>, BlockError> {
    match array {
        ColumnArray::Mixed(values) => Ok(values.clone()),
        other => {
            // Materialize through a staging buffer so every typed variant
            // shares one boxing path.
            Ok(registry::make_block(other.clone(), 0)?.column_scalars(0))
        }
    }
}

// ── persisted state ────────────────────────────────────────────────────

/// Serialized layout: both label sequences plus the ordered
/// `(placement, payload)` buffer list. Deserialization rebuilds every
/// buffer through the kind-dispatch factory and re-checks integrity, so a
/// corrupted payload cannot produce a structurally invalid collection.
#[derive(Serialize, Deserialize)]
struct CollectionRepr {
    row_labels: Vec<Label>,
    col_labels: Vec<Label>,
    blocks: Vec<RawBlock>,
}

impl Serialize for BlockCollection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = CollectionRepr {
            row_labels: self.row_axis.labels().to_vec(),
            col_labels: self.col_axis.labels().to_vec(),
            blocks: self.blocks.iter().map(Block::to_raw).collect(),
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlockCollection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let repr = CollectionRepr::deserialize(deserializer)?;
        let blocks = repr
            .blocks
            .into_iter()
            .map(Block::from_raw)
            .collect::<Result<Vec<_>, _>>()
            .map_err(D::Error::custom)?;
        Self::from_blocks(
            blocks,
            AxisIndex::new(repr.row_labels),
            AxisIndex::new(repr.col_labels),
        )
        .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use fb_block::registry::ColumnArray;
    use fb_index::{AxisIndex, Label};
    use fb_types::{CastPolicy, Kind, Scalar};

    use super::{Axis, BlockCollection, ColumnSelection};

    fn sample() -> BlockCollection {
        BlockCollection::from_columns(
            vec![
                ("a".into(), ColumnArray::Int64(vec![1, 2, 3])),
                ("b".into(), ColumnArray::Float64(vec![1.5, 2.5, 3.5])),
                ("c".into(), ColumnArray::Int64(vec![10, 20, 30])),
            ],
            AxisIndex::from_range(0, 3),
        )
        .expect("sample builds")
    }

    #[test]
    fn construction_groups_same_kind_columns() {
        let collection = sample();
        collection.verify_integrity().expect("invariants hold");
        assert_eq!(collection.blocks().len(), 2, "int columns share a buffer");
        assert_eq!(collection.dtype_counts()[&Kind::Int64], 2);
        assert_eq!(collection.dtype_counts()[&Kind::Float64], 1);
        assert!(collection.is_mixed_type());
    }

    #[test]
    fn construction_rejects_ragged_columns() {
        let err = BlockCollection::from_columns(
            vec![("a".into(), ColumnArray::Int64(vec![1, 2]))],
            AxisIndex::from_range(0, 3),
        )
        .expect_err("two values cannot span three rows");
        assert_eq!(err.to_string(), "shape mismatch: expected 3, found 2");
    }

    #[test]
    fn get_column_resolves_unique_label() {
        let collection = sample();
        let ColumnSelection::Single(column) =
            collection.get_column(&"b".into()).expect("label exists")
        else {
            panic!("unique label must resolve to a single column");
        };
        assert_eq!(column.kind(), Kind::Float64);
        assert_eq!(column.column_scalars(0)[1], Scalar::Float64(2.5));
        assert!(column.is_view(), "column access does not copy");
    }

    #[test]
    fn get_missing_label_errors() {
        let collection = sample();
        let err = collection.get_column(&"zz".into()).expect_err("absent");
        assert_eq!(err.to_string(), "label 'zz' not found in axis");
    }

    #[test]
    fn duplicate_label_yields_sub_collection() {
        let mut collection = sample();
        collection
            .insert(1, "a".into(), ColumnArray::Float64(vec![9.0, 9.0, 9.0]), true)
            .expect("duplicate insert allowed");

        let ColumnSelection::Multiple(sub) =
            collection.get_column(&"a".into()).expect("label exists")
        else {
            panic!("duplicated label must resolve to a sub-collection");
        };
        assert_eq!(sub.ncols(), 2);
        sub.verify_integrity().expect("sub-collection is valid");
        assert_eq!(sub.column_kind(0), Kind::Int64);
        assert_eq!(sub.column_kind(1), Kind::Float64);
    }

    #[test]
    fn insert_then_delete_restores_original() {
        let mut collection = sample();
        let original = collection.copy(true).expect("deep copy");

        collection
            .insert(1, "tmp".into(), ColumnArray::Int64(vec![7, 8, 9]), false)
            .expect("insert passes");
        assert_eq!(collection.ncols(), 4);
        collection.delete(&"tmp".into()).expect("delete passes");

        assert!(collection.equals(&original));
    }

    #[test]
    fn insert_rejects_duplicate_when_disallowed() {
        let mut collection = sample();
        let err = collection
            .insert(0, "a".into(), ColumnArray::Int64(vec![0, 0, 0]), false)
            .expect_err("duplicate must be rejected");
        assert_eq!(
            err.to_string(),
            "label 'a' already exists and duplicates were not allowed"
        );
    }

    #[test]
    fn failed_insert_leaves_collection_unchanged() {
        let mut collection = sample();
        let before = collection.copy(true).expect("deep copy");
        collection
            .insert(1, "bad".into(), ColumnArray::Int64(vec![1]), false)
            .expect_err("length mismatch");
        assert!(collection.equals(&before));
        collection.verify_integrity().expect("still intact");
    }

    #[test]
    fn incompatible_assignment_splits_buffer() {
        let mut collection = BlockCollection::from_columns(
            vec![
                ("x".into(), ColumnArray::Int64(vec![1, 2, 3])),
                ("y".into(), ColumnArray::Int64(vec![4, 5, 6])),
            ],
            AxisIndex::from_range(0, 3),
        )
        .expect("builds");
        assert_eq!(collection.blocks().len(), 1);

        collection
            .set_column(&"x".into(), ColumnArray::Float64(vec![1.5, 2.5, 3.5]))
            .expect("assignment passes");

        assert_eq!(collection.column_kind(0), Kind::Float64);
        assert_eq!(collection.column_kind(1), Kind::Int64);
        let counts = collection.dtype_counts();
        assert_eq!(counts[&Kind::Int64], 1);
        assert_eq!(counts[&Kind::Float64], 1);
        assert_eq!(collection.column_scalars(1), vec![
            Scalar::Int64(4),
            Scalar::Int64(5),
            Scalar::Int64(6),
        ]);
    }

    #[test]
    fn compatible_assignment_stays_in_place() {
        let mut collection = sample();
        collection
            .set_column(&"b".into(), ColumnArray::Int64(vec![1, 2, 3]))
            .expect("integral values fit the float buffer");
        // Promotion is monotonic: the column does not silently demote.
        assert_eq!(collection.column_kind(1), Kind::Float64);
        assert_eq!(collection.column_scalars(1)[0], Scalar::Float64(1.0));
    }

    #[test]
    fn set_new_label_appends() {
        let mut collection = sample();
        collection
            .set_column(&"d".into(), ColumnArray::Bool(vec![true, false, true]))
            .expect("append passes");
        assert_eq!(collection.ncols(), 4);
        assert_eq!(collection.column_kind(3), Kind::Bool);
    }

    #[test]
    fn delete_removes_all_duplicates() {
        let mut collection = sample();
        collection
            .insert(0, "a".into(), ColumnArray::Float64(vec![0.0, 0.0, 0.0]), true)
            .expect("duplicate insert");
        collection.delete(&"a".into()).expect("delete all matches");
        assert_eq!(
            collection.col_axis().labels(),
            &[Label::from("b"), Label::from("c")]
        );
        collection.verify_integrity().expect("intact");
    }

    #[test]
    fn delete_keeps_survivors_as_views() {
        let mut collection = BlockCollection::from_columns(
            vec![
                ("p".into(), ColumnArray::Int64(vec![1, 2])),
                ("q".into(), ColumnArray::Int64(vec![3, 4])),
                ("r".into(), ColumnArray::Int64(vec![5, 6])),
            ],
            AxisIndex::from_range(0, 2),
        )
        .expect("builds");
        collection.delete(&"q".into()).expect("delete passes");

        assert_eq!(collection.ncols(), 2);
        assert!(collection.blocks().iter().all(fb_block::Block::is_view));
        assert_eq!(collection.column_scalars(1), vec![Scalar::Int64(5), Scalar::Int64(6)]);
    }

    #[test]
    fn take_full_identity_round_trips() {
        let collection = sample();
        let rows = collection.take(&[0, 1, 2], Axis::Rows).expect("take rows");
        assert!(rows.equals(&collection));
        let cols = collection.take(&[0, 1, 2], Axis::Columns).expect("take cols");
        assert!(cols.equals(&collection));
    }

    #[test]
    fn take_rejects_out_of_range() {
        let collection = sample();
        collection.take(&[7], Axis::Rows).expect_err("row 7 absent");
        collection.take(&[7], Axis::Columns).expect_err("col 7 absent");
    }

    #[test]
    fn reindex_columns_fills_new_labels_with_fill_kind() {
        let collection = sample();
        let target = AxisIndex::new(vec!["a".into(), "b".into(), "z".into()]);
        let out = collection
            .reindex_axis(&target, Axis::Columns, Some(&Scalar::Int64(0)), false)
            .expect("reindex passes");

        assert_eq!(out.ncols(), 3);
        assert_eq!(out.column_kind(2), Kind::Int64);
        assert_eq!(out.column_scalars(2), vec![
            Scalar::Int64(0),
            Scalar::Int64(0),
            Scalar::Int64(0),
        ]);
        // Surviving columns keep their data.
        assert_eq!(out.column_scalars(0), collection.column_scalars(0));
        assert_eq!(out.column_scalars(1), collection.column_scalars(1));
    }

    #[test]
    fn reindex_rows_defaults_to_kind_missing() {
        let collection = sample();
        let target = AxisIndex::from_i64(vec![0, 1, 5]);
        let out = collection
            .reindex_axis(&target, Axis::Rows, None, false)
            .expect("reindex passes");

        // Int columns promote to float to admit the hole.
        assert_eq!(out.column_kind(0), Kind::Float64);
        assert!(out.column_scalars(0)[2].is_missing());
        assert_eq!(out.column_scalars(0)[0], Scalar::Float64(1.0));
    }

    #[test]
    fn reindex_rows_with_explicit_fill() {
        let collection = sample();
        let target = AxisIndex::from_i64(vec![1, 9]);
        let out = collection
            .reindex_axis(&target, Axis::Rows, Some(&Scalar::Int64(-1)), false)
            .expect("reindex passes");

        assert_eq!(out.column_kind(0), Kind::Int64, "int fill keeps int kind");
        assert_eq!(out.column_scalars(0), vec![Scalar::Int64(2), Scalar::Int64(-1)]);
    }

    #[test]
    fn reindex_same_axis_without_copy_shares_storage() {
        let collection = sample();
        let out = collection
            .reindex_axis(&collection.col_axis().clone(), Axis::Columns, None, false)
            .expect("reindex passes");
        assert!(out.blocks().iter().all(fb_block::Block::is_view));
        let deep = collection
            .reindex_axis(&collection.col_axis().clone(), Axis::Columns, None, true)
            .expect("reindex passes");
        assert!(deep.equals(&collection));
    }

    #[test]
    fn consolidate_merges_and_is_idempotent() {
        let mut collection = sample();
        collection
            .insert(3, "d".into(), ColumnArray::Int64(vec![7, 8, 9]), false)
            .expect("insert passes");
        assert!(!collection.is_consolidated());

        let once = collection.consolidate().expect("consolidate passes");
        assert!(once.is_consolidated());
        let int_widths: Vec<usize> = once
            .blocks()
            .iter()
            .filter(|b| b.kind() == Kind::Int64)
            .map(fb_block::Block::width)
            .collect();
        assert_eq!(int_widths, vec![3], "one int buffer holds all int columns");

        let twice = once.consolidate().expect("second consolidate");
        assert_eq!(
            twice.blocks().len(),
            once.blocks().len(),
            "idempotent partition"
        );
        assert!(twice.equals(&collection));
    }

    #[test]
    fn astype_converts_every_buffer() {
        let collection = sample();
        let floats = collection
            .astype(Kind::Float64, CastPolicy::Strict)
            .expect("astype passes");
        assert_eq!(floats.dtype_counts()[&Kind::Float64], 3);
        assert_eq!(floats.column_scalars(0)[0], Scalar::Float64(1.0));
    }

    #[test]
    fn putmask_splits_only_where_needed() {
        let collection = sample();
        let out = collection
            .putmask(&[true, false, false], &Scalar::Float64(0.5))
            .expect("putmask passes");
        assert_eq!(out.column_kind(0), Kind::Float64, "int columns promote");
        assert_eq!(out.column_scalars(0)[0], Scalar::Float64(0.5));
        assert_eq!(out.column_scalars(1)[1], Scalar::Float64(2.5), "untouched rows survive");
    }

    #[test]
    fn convert_narrows_object_columns() {
        let collection = BlockCollection::from_columns(
            vec![
                (
                    "nums".into(),
                    ColumnArray::Mixed(vec![
                        Scalar::Utf8("x".to_owned()),
                        Scalar::Int64(1),
                    ]),
                ),
                (
                    "text".into(),
                    ColumnArray::Utf8(vec![Some("a".to_owned()), Some("b".to_owned())]),
                ),
            ],
            AxisIndex::from_range(0, 2),
        )
        .expect("builds");

        let mut retyped = collection.copy(true).expect("deep copy");
        retyped
            .set_column(&"nums".into(), ColumnArray::Mixed(vec![Scalar::Int64(3), Scalar::Int64(4)]))
            .expect("assignment");
        let converted = retyped.convert().expect("convert passes");
        assert_eq!(converted.column_kind(0), Kind::Int64);
        assert_eq!(converted.column_kind(1), Kind::Object, "strings stay objects");
    }

    #[test]
    fn merge_concatenates_column_sets() {
        let left = sample();
        let right = BlockCollection::from_columns(
            vec![("d".into(), ColumnArray::Bool(vec![true, true, false]))],
            AxisIndex::from_range(0, 3),
        )
        .expect("builds");

        let merged = left.merge(&right).expect("merge passes");
        assert_eq!(merged.ncols(), 4);
        assert_eq!(merged.column_kind(3), Kind::Bool);
        merged.verify_integrity().expect("intact");

        let misaligned = BlockCollection::from_columns(
            vec![("d".into(), ColumnArray::Bool(vec![true]))],
            AxisIndex::from_range(0, 1),
        )
        .expect("builds");
        left.merge(&misaligned).expect_err("row axes differ");
    }

    #[test]
    fn vstack_concatenates_rows_kind_to_kind() {
        let top = sample();
        let bottom = sample();
        let stacked = top.vstack(&bottom).expect("vstack passes");
        assert_eq!(stacked.nrows(), 6);
        assert_eq!(stacked.column_kind(0), Kind::Int64);
        assert_eq!(stacked.column_scalars(0), vec![
            Scalar::Int64(1),
            Scalar::Int64(2),
            Scalar::Int64(3),
            Scalar::Int64(1),
            Scalar::Int64(2),
            Scalar::Int64(3),
        ]);
    }

    #[test]
    fn vstack_promotes_mismatched_kinds() {
        let top = sample();
        let mut bottom = sample();
        bottom
            .set_column(&"a".into(), ColumnArray::Float64(vec![0.5, 1.5, 2.5]))
            .expect("assignment");

        let stacked = top.vstack(&bottom).expect("vstack passes");
        assert_eq!(stacked.column_kind(0), Kind::Float64);
        assert_eq!(stacked.column_scalars(0)[0], Scalar::Float64(1.0));
        assert_eq!(stacked.column_scalars(0)[3], Scalar::Float64(0.5));
    }

    #[test]
    fn slice_rows_is_a_window() {
        let collection = sample();
        let window = collection.slice_rows(1, 2);
        assert_eq!(window.nrows(), 2);
        assert_eq!(window.column_scalars(0), vec![Scalar::Int64(2), Scalar::Int64(3)]);
        window.verify_integrity().expect("intact");
    }

    #[test]
    fn shift_moves_rows_and_promotes() {
        let collection = sample();
        let shifted = collection.shift(1).expect("shift passes");
        assert_eq!(shifted.column_kind(0), Kind::Float64);
        assert!(shifted.column_scalars(0)[0].is_missing());
        assert_eq!(shifted.column_scalars(0)[1], Scalar::Float64(1.0));
    }

    #[test]
    fn as_object_rows_boxes_every_cell() {
        let collection = sample();
        let rows = collection.as_object_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![
            Scalar::Int64(1),
            Scalar::Float64(1.5),
            Scalar::Int64(10),
        ]);
    }

    #[test]
    fn integrity_violation_fails_loudly() {
        let collection = sample();
        let blocks = collection.blocks().to_vec();
        let err = BlockCollection::from_blocks(
            blocks,
            AxisIndex::from_range(0, 3),
            AxisIndex::new(vec!["only".into()]),
        )
        .expect_err("three buffers cannot cover one label");
        assert!(err.to_string().starts_with("internal integrity violation"));
    }

    #[test]
    fn serde_round_trip_reproduces_collection() {
        let mut collection = sample();
        collection
            .insert(
                3,
                "cat".into(),
                ColumnArray::Categorical(
                    vec![0, 1, 0],
                    vec![Scalar::Utf8("x".to_owned()), Scalar::Utf8("y".to_owned())],
                ),
                false,
            )
            .expect("insert passes");

        let json = serde_json::to_string(&collection).expect("serialize");
        let back: BlockCollection = serde_json::from_str(&json).expect("deserialize");
        assert!(back.equals(&collection));
        assert_eq!(back.column_kind(3), Kind::Categorical);
    }

    #[test]
    fn serde_rejects_corrupted_payload() {
        let collection = sample();
        let json = serde_json::to_string(&collection).expect("serialize");
        // Drop one column label so placements no longer partition the axis.
        let corrupted = json.replace("\"col_labels\":[{\"kind\":\"utf8\",\"value\":\"a\"},", "\"col_labels\":[");
        serde_json::from_str::<BlockCollection>(&corrupted).expect_err("integrity must fail");
    }

    #[test]
    fn shallow_copy_shares_deep_copy_detaches() {
        let collection = sample();
        let shallow = collection.copy(false).expect("shallow");
        assert!(shallow.blocks().iter().all(fb_block::Block::is_view));

        let deep = collection.copy(true).expect("deep");
        // Dropping the shallow copy restores exclusivity to nobody; the
        // deep copy owns its storage outright either way.
        drop(shallow);
        assert!(deep.blocks().iter().all(|b| !b.is_view()));
        assert!(deep.equals(&collection));
    }

    #[test]
    fn missing_null_kind_used_for_default_fill() {
        let collection = sample();
        let target = AxisIndex::new(vec!["a".into(), "new".into()]);
        let out = collection
            .reindex_axis(&target, Axis::Columns, None, false)
            .expect("reindex passes");
        assert_eq!(out.column_kind(1), Kind::Float64);
        assert!(out.column_scalars(1).iter().all(Scalar::is_missing));
    }
}
