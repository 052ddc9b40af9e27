#![forbid(unsafe_code)]

pub mod placement;
pub mod registry;
pub mod storage;

use fb_types::{CastPolicy, Kind, NAT, NullKind, Scalar, TypeError, can_hold, cast_scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use placement::ColumnPlacement;
pub use storage::SharedVec;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockError {
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("kind mismatch: {left:?} vs {right:?}")]
    KindMismatch { left: Kind, right: Kind },
    #[error("placement of {placement} slots does not cover buffer width {width}")]
    PlacementWidthMismatch { placement: usize, width: usize },
    #[error("position {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("{kind:?} buffer cannot hold the assigned value")]
    CannotHold { kind: Kind },
    #[error("{kind:?} buffers are single-column")]
    NotConsolidatable { kind: Kind },
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Fixed-offset timezone tag carried by timezone-aware buffers. Calendar
/// arithmetic is outside this layer; the tag only has to survive casts,
/// concatenation and the serde round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TzInfo {
    pub name: String,
    pub offset_minutes: i32,
}

/// Column-major `rows x width` storage of one element type.
#[derive(Debug, Clone)]
pub struct TypedData<T> {
    data: SharedVec<T>,
    rows: usize,
    width: usize,
}

impl<T: Clone> TypedData<T> {
    pub fn new(data: SharedVec<T>, rows: usize, width: usize) -> Result<Self, BlockError> {
        if data.len() != rows * width {
            return Err(BlockError::ShapeMismatch {
                expected: rows * width,
                found: data.len(),
            });
        }
        Ok(Self { data, rows, width })
    }

    #[must_use]
    pub fn from_column(values: Vec<T>) -> Self {
        let rows = values.len();
        Self {
            data: SharedVec::from_vec(values),
            rows,
            width: 1,
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        self.data.is_view()
    }

    #[must_use]
    pub fn column(&self, offset: usize) -> SharedVec<T> {
        self.data.view(offset * self.rows, self.rows)
    }

    #[must_use]
    pub fn column_slice(&self, offset: usize) -> &[T] {
        &self.data.as_slice()[offset * self.rows..(offset + 1) * self.rows]
    }

    #[must_use]
    pub fn get(&self, row: usize, offset: usize) -> &T {
        &self.data.as_slice()[offset * self.rows + row]
    }

    pub fn set(&mut self, row: usize, offset: usize, value: T) {
        let rows = self.rows;
        self.data.as_mut_slice()[offset * rows + row] = value;
    }

    /// Contiguous column-range view; never copies.
    #[must_use]
    pub fn slice_columns(&self, start: usize, width: usize) -> Self {
        Self {
            data: self.data.view(start * self.rows, width * self.rows),
            rows: self.rows,
            width,
        }
    }

    /// Row window. A view for single-column storage; wider buffers copy,
    /// because a row range is strided across columns.
    #[must_use]
    pub fn slice_rows(&self, start: usize, len: usize) -> Self {
        if self.width == 1 {
            return Self {
                data: self.data.view(start, len),
                rows: len,
                width: 1,
            };
        }
        let mut out = Vec::with_capacity(len * self.width);
        for offset in 0..self.width {
            out.extend_from_slice(&self.column_slice(offset)[start..start + len]);
        }
        Self {
            data: SharedVec::from_vec(out),
            rows: len,
            width: self.width,
        }
    }

    /// Row gather across every column; `None` slots take `fill`.
    #[must_use]
    pub fn take_rows(&self, indexer: &[Option<usize>], fill: &T) -> Self {
        let mut out = Vec::with_capacity(indexer.len() * self.width);
        for offset in 0..self.width {
            let column = self.column_slice(offset);
            for slot in indexer {
                out.push(match slot {
                    Some(idx) => column[*idx].clone(),
                    None => fill.clone(),
                });
            }
        }
        Self {
            data: SharedVec::from_vec(out),
            rows: indexer.len(),
            width: self.width,
        }
    }

    /// Column gather by storage offset.
    #[must_use]
    pub fn take_columns(&self, offsets: &[usize]) -> Self {
        let mut out = Vec::with_capacity(self.rows * offsets.len());
        for &offset in offsets {
            out.extend_from_slice(self.column_slice(offset));
        }
        Self {
            data: SharedVec::from_vec(out),
            rows: self.rows,
            width: offsets.len(),
        }
    }

    pub fn concat_columns(parts: &[&Self]) -> Result<Self, BlockError> {
        let rows = parts.first().map_or(0, |p| p.rows);
        for part in parts {
            if part.rows != rows {
                return Err(BlockError::ShapeMismatch {
                    expected: rows,
                    found: part.rows,
                });
            }
        }
        let windows: Vec<&SharedVec<T>> = parts.iter().map(|p| &p.data).collect();
        Ok(Self {
            data: SharedVec::concat(&windows),
            rows,
            width: parts.iter().map(|p| p.width).sum(),
        })
    }

    pub fn concat_rows(parts: &[&Self]) -> Result<Self, BlockError> {
        let width = parts.first().map_or(0, |p| p.width);
        for part in parts {
            if part.width != width {
                return Err(BlockError::ShapeMismatch {
                    expected: width,
                    found: part.width,
                });
            }
        }
        let rows: usize = parts.iter().map(|p| p.rows).sum();
        let mut out = Vec::with_capacity(rows * width);
        for offset in 0..width {
            for part in parts {
                out.extend_from_slice(part.column_slice(offset));
            }
        }
        Ok(Self {
            data: SharedVec::from_vec(out),
            rows,
            width,
        })
    }
}

/// Sparse single-column float storage: explicit positions plus a fill
/// value for every other row (the original's fill-value encoding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseData {
    positions: SharedVec<u32>,
    values: SharedVec<f64>,
    fill: f64,
    len: usize,
}

impl SparseData {
    #[must_use]
    pub fn from_dense(dense: &[f64], fill: f64) -> Self {
        let mut positions = Vec::new();
        let mut values = Vec::new();
        for (row, &value) in dense.iter().enumerate() {
            let matches_fill = value == fill || (value.is_nan() && fill.is_nan());
            if !matches_fill {
                positions.push(row as u32);
                values.push(value);
            }
        }
        Self {
            positions: SharedVec::from_vec(positions),
            values: SharedVec::from_vec(values),
            fill,
            len: dense.len(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn fill(&self) -> f64 {
        self.fill
    }

    #[must_use]
    pub fn density(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.values.len() as f64 / self.len as f64
    }

    #[must_use]
    pub fn get(&self, row: usize) -> f64 {
        match self
            .positions
            .as_slice()
            .binary_search(&(row as u32))
        {
            Ok(slot) => self.values.as_slice()[slot],
            Err(_) => self.fill,
        }
    }

    #[must_use]
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![self.fill; self.len];
        for (slot, &row) in self.positions.as_slice().iter().enumerate() {
            dense[row as usize] = self.values.as_slice()[slot];
        }
        dense
    }

    fn same_fill(&self, other: &Self) -> bool {
        self.fill == other.fill || (self.fill.is_nan() && other.fill.is_nan())
    }
}

/// The typed payload of a block, one variant per element kind.
#[derive(Debug, Clone)]
pub enum BlockValues {
    Float64(TypedData<f64>),
    Int64(TypedData<i64>),
    Bool(TypedData<bool>),
    Object(TypedData<Scalar>),
    DateTime(TypedData<i64>),
    DateTimeTz { data: TypedData<i64>, tz: TzInfo },
    TimeDelta(TypedData<i64>),
    Categorical {
        codes: TypedData<i32>,
        categories: std::sync::Arc<Vec<Scalar>>,
    },
    Sparse(SparseData),
}

impl BlockValues {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Float64(_) => Kind::Float64,
            Self::Int64(_) => Kind::Int64,
            Self::Bool(_) => Kind::Bool,
            Self::Object(_) => Kind::Object,
            Self::DateTime(_) => Kind::DateTime,
            Self::DateTimeTz { .. } => Kind::DateTimeTz,
            Self::TimeDelta(_) => Kind::TimeDelta,
            Self::Categorical { .. } => Kind::Categorical,
            Self::Sparse(_) => Kind::Sparse,
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Float64(d) => d.rows(),
            Self::Int64(d) | Self::DateTime(d) | Self::TimeDelta(d) => d.rows(),
            Self::DateTimeTz { data, .. } => data.rows(),
            Self::Bool(d) => d.rows(),
            Self::Object(d) => d.rows(),
            Self::Categorical { codes, .. } => codes.rows(),
            Self::Sparse(s) => s.len(),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Self::Float64(d) => d.width(),
            Self::Int64(d) | Self::DateTime(d) | Self::TimeDelta(d) => d.width(),
            Self::DateTimeTz { data, .. } => data.width(),
            Self::Bool(d) => d.width(),
            Self::Object(d) => d.width(),
            Self::Categorical { codes, .. } => codes.width(),
            Self::Sparse(_) => 1,
        }
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        match self {
            Self::Float64(d) => d.is_view(),
            Self::Int64(d) | Self::DateTime(d) | Self::TimeDelta(d) => d.is_view(),
            Self::DateTimeTz { data, .. } => data.is_view(),
            Self::Bool(d) => d.is_view(),
            Self::Object(d) => d.is_view(),
            Self::Categorical { codes, .. } => codes.is_view(),
            Self::Sparse(s) => s.positions.is_view() || s.values.is_view(),
        }
    }
}

/// One homogeneous storage unit plus its placement bookkeeping: which
/// logical column slots it supplies, in storage order.
#[derive(Debug, Clone)]
pub struct Block {
    values: BlockValues,
    placement: ColumnPlacement,
}

impl Block {
    pub fn new(values: BlockValues, placement: ColumnPlacement) -> Result<Self, BlockError> {
        if placement.len() != values.width() {
            return Err(BlockError::PlacementWidthMismatch {
                placement: placement.len(),
                width: values.width(),
            });
        }
        if !values.kind().can_consolidate() && values.width() != 1 {
            return Err(BlockError::NotConsolidatable {
                kind: values.kind(),
            });
        }
        Ok(Self { values, placement })
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.values.kind()
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.values.rows()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.values.width()
    }

    #[must_use]
    pub fn values(&self) -> &BlockValues {
        &self.values
    }

    #[must_use]
    pub fn placement(&self) -> &ColumnPlacement {
        &self.placement
    }

    pub fn placement_mut(&mut self) -> &mut ColumnPlacement {
        &mut self.placement
    }

    #[must_use]
    pub fn with_placement(mut self, placement: ColumnPlacement) -> Result<Self, BlockError> {
        if placement.len() != self.width() {
            return Err(BlockError::PlacementWidthMismatch {
                placement: placement.len(),
                width: self.width(),
            });
        }
        self.placement = placement;
        Ok(self)
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        self.values.is_view()
    }

    // ── element access ─────────────────────────────────────────────────

    pub fn get_value(&self, row: usize, offset: usize) -> Result<Scalar, BlockError> {
        if row >= self.rows() {
            return Err(BlockError::OutOfBounds {
                index: row,
                len: self.rows(),
            });
        }
        if offset >= self.width() {
            return Err(BlockError::OutOfBounds {
                index: offset,
                len: self.width(),
            });
        }
        Ok(self.scalar_at(row, offset))
    }

    fn scalar_at(&self, row: usize, offset: usize) -> Scalar {
        match &self.values {
            BlockValues::Float64(d) => Scalar::Float64(*d.get(row, offset)),
            BlockValues::Int64(d) => Scalar::Int64(*d.get(row, offset)),
            BlockValues::Bool(d) => Scalar::Bool(*d.get(row, offset)),
            BlockValues::Object(d) => d.get(row, offset).clone(),
            BlockValues::DateTime(d) | BlockValues::DateTimeTz { data: d, .. } => {
                Scalar::DateTime(*d.get(row, offset))
            }
            BlockValues::TimeDelta(d) => Scalar::TimeDelta(*d.get(row, offset)),
            BlockValues::Categorical { codes, categories } => {
                let code = *codes.get(row, offset);
                if code < 0 {
                    Scalar::Null(NullKind::Null)
                } else {
                    categories[code as usize].clone()
                }
            }
            BlockValues::Sparse(s) => Scalar::Float64(s.get(row)),
        }
    }

    /// Materialize one column in storage order.
    #[must_use]
    pub fn column_scalars(&self, offset: usize) -> Vec<Scalar> {
        (0..self.rows()).map(|row| self.scalar_at(row, offset)).collect()
    }

    /// Value-aware holdability. Extends the kind-level query with the
    /// buffer-local facts a kind cannot know: category membership.
    #[must_use]
    pub fn can_hold(&self, value: &Scalar) -> bool {
        match &self.values {
            BlockValues::Categorical { categories, .. } => {
                value.is_missing() || categories.iter().any(|c| c == value)
            }
            _ => can_hold(self.kind(), value),
        }
    }

    pub fn set_value(&mut self, row: usize, offset: usize, value: &Scalar) -> Result<(), BlockError> {
        if row >= self.rows() {
            return Err(BlockError::OutOfBounds {
                index: row,
                len: self.rows(),
            });
        }
        if offset >= self.width() {
            return Err(BlockError::OutOfBounds {
                index: offset,
                len: self.width(),
            });
        }
        if !self.can_hold(value) {
            return Err(BlockError::CannotHold { kind: self.kind() });
        }
        self.write_scalar(row, offset, value);
        Ok(())
    }

    /// Overwrite one whole column in place (copy-on-write). Every value
    /// must already be holdable; callers route incompatible values through
    /// the replace path instead.
    pub fn set_column_scalars(&mut self, offset: usize, values: &[Scalar]) -> Result<(), BlockError> {
        if values.len() != self.rows() {
            return Err(BlockError::ShapeMismatch {
                expected: self.rows(),
                found: values.len(),
            });
        }
        if offset >= self.width() {
            return Err(BlockError::OutOfBounds {
                index: offset,
                len: self.width(),
            });
        }
        if values.iter().any(|v| !self.can_hold(v)) {
            return Err(BlockError::CannotHold { kind: self.kind() });
        }
        for (row, value) in values.iter().enumerate() {
            self.write_scalar(row, offset, value);
        }
        Ok(())
    }

    fn write_scalar(&mut self, row: usize, offset: usize, value: &Scalar) {
        match &mut self.values {
            BlockValues::Float64(d) => {
                let v = match value {
                    Scalar::Float64(v) => *v,
                    Scalar::Int64(v) => *v as f64,
                    Scalar::Bool(v) => f64::from(u8::from(*v)),
                    _ => f64::NAN,
                };
                d.set(row, offset, v);
            }
            BlockValues::Int64(d) => {
                let v = match value {
                    Scalar::Int64(v) => *v,
                    Scalar::Bool(v) => i64::from(*v),
                    Scalar::Float64(v) => *v as i64,
                    _ => 0,
                };
                d.set(row, offset, v);
            }
            BlockValues::Bool(d) => {
                if let Scalar::Bool(v) = value {
                    d.set(row, offset, *v);
                }
            }
            BlockValues::Object(d) => d.set(row, offset, value.clone()),
            BlockValues::DateTime(d) | BlockValues::DateTimeTz { data: d, .. } => {
                let v = match value {
                    Scalar::DateTime(v) => *v,
                    _ => NAT,
                };
                d.set(row, offset, v);
            }
            BlockValues::TimeDelta(d) => {
                let v = match value {
                    Scalar::TimeDelta(v) => *v,
                    _ => NAT,
                };
                d.set(row, offset, v);
            }
            BlockValues::Categorical { codes, categories } => {
                let code = if value.is_missing() {
                    -1
                } else {
                    categories
                        .iter()
                        .position(|c| c == value)
                        .map_or(-1, |p| p as i32)
                };
                codes.set(row, offset, code);
            }
            BlockValues::Sparse(s) => {
                // Sparse storage rewrites densely on assignment.
                let mut dense = s.to_dense();
                if let Ok(v) = value.to_f64() {
                    dense[row] = v;
                } else {
                    dense[row] = f64::NAN;
                }
                *s = SparseData::from_dense(&dense, s.fill);
            }
        }
    }

    // ── slicing and gathering ──────────────────────────────────────────

    /// Contiguous column-range view sharing storage; kind is preserved.
    pub fn slice_columns(&self, start: usize, width: usize) -> Result<Self, BlockError> {
        if start + width > self.width() {
            return Err(BlockError::OutOfBounds {
                index: start + width,
                len: self.width(),
            });
        }
        let offsets: Vec<usize> = (start..start + width).collect();
        let placement = self.placement.take(&offsets);
        let values = match &self.values {
            BlockValues::Float64(d) => BlockValues::Float64(d.slice_columns(start, width)),
            BlockValues::Int64(d) => BlockValues::Int64(d.slice_columns(start, width)),
            BlockValues::Bool(d) => BlockValues::Bool(d.slice_columns(start, width)),
            BlockValues::Object(d) => BlockValues::Object(d.slice_columns(start, width)),
            BlockValues::DateTime(d) => BlockValues::DateTime(d.slice_columns(start, width)),
            BlockValues::DateTimeTz { data, tz } => BlockValues::DateTimeTz {
                data: data.slice_columns(start, width),
                tz: tz.clone(),
            },
            BlockValues::TimeDelta(d) => BlockValues::TimeDelta(d.slice_columns(start, width)),
            BlockValues::Categorical { codes, categories } => BlockValues::Categorical {
                codes: codes.slice_columns(start, width),
                categories: std::sync::Arc::clone(categories),
            },
            BlockValues::Sparse(s) => BlockValues::Sparse(s.clone()),
        };
        Self::new(values, placement)
    }

    /// Single-column view keeping the column's logical slot.
    pub fn column_block(&self, offset: usize) -> Result<Self, BlockError> {
        self.slice_columns(offset, 1)
    }

    /// Row window; kind is preserved. A view for width-1 buffers.
    #[must_use]
    pub fn slice_rows(&self, start: usize, len: usize) -> Self {
        let values = match &self.values {
            BlockValues::Float64(d) => BlockValues::Float64(d.slice_rows(start, len)),
            BlockValues::Int64(d) => BlockValues::Int64(d.slice_rows(start, len)),
            BlockValues::Bool(d) => BlockValues::Bool(d.slice_rows(start, len)),
            BlockValues::Object(d) => BlockValues::Object(d.slice_rows(start, len)),
            BlockValues::DateTime(d) => BlockValues::DateTime(d.slice_rows(start, len)),
            BlockValues::DateTimeTz { data, tz } => BlockValues::DateTimeTz {
                data: data.slice_rows(start, len),
                tz: tz.clone(),
            },
            BlockValues::TimeDelta(d) => BlockValues::TimeDelta(d.slice_rows(start, len)),
            BlockValues::Categorical { codes, categories } => BlockValues::Categorical {
                codes: codes.slice_rows(start, len),
                categories: std::sync::Arc::clone(categories),
            },
            BlockValues::Sparse(s) => {
                let dense = s.to_dense();
                BlockValues::Sparse(SparseData::from_dense(&dense[start..start + len], s.fill))
            }
        };
        Self {
            values,
            placement: self.placement.clone(),
        }
    }

    /// Gather rows by position. `None` entries synthesize the kind's
    /// missing marker; kinds without a native marker promote first
    /// (Int64 to Float64, Bool to Object), the invariant-preserving
    /// escape hatch used throughout the manager.
    pub fn take_rows(&self, indexer: &[Option<usize>]) -> Result<Self, BlockError> {
        let rows = self.rows();
        for slot in indexer.iter().flatten() {
            if *slot >= rows {
                return Err(BlockError::OutOfBounds {
                    index: *slot,
                    len: rows,
                });
            }
        }

        let introduces_missing = indexer.iter().any(Option::is_none);
        if introduces_missing && !self.kind().can_hold_na() {
            let promoted = match self.kind() {
                Kind::Int64 => Kind::Float64,
                _ => Kind::Object,
            };
            return self.astype(promoted, CastPolicy::Strict)?.take_rows(indexer);
        }

        let values = match &self.values {
            BlockValues::Float64(d) => BlockValues::Float64(d.take_rows(indexer, &f64::NAN)),
            BlockValues::Int64(d) => BlockValues::Int64(d.take_rows(indexer, &0)),
            BlockValues::Bool(d) => BlockValues::Bool(d.take_rows(indexer, &false)),
            BlockValues::Object(d) => {
                BlockValues::Object(d.take_rows(indexer, &Scalar::Null(NullKind::Null)))
            }
            BlockValues::DateTime(d) => BlockValues::DateTime(d.take_rows(indexer, &NAT)),
            BlockValues::DateTimeTz { data, tz } => BlockValues::DateTimeTz {
                data: data.take_rows(indexer, &NAT),
                tz: tz.clone(),
            },
            BlockValues::TimeDelta(d) => BlockValues::TimeDelta(d.take_rows(indexer, &NAT)),
            BlockValues::Categorical { codes, categories } => BlockValues::Categorical {
                codes: codes.take_rows(indexer, &-1),
                categories: std::sync::Arc::clone(categories),
            },
            BlockValues::Sparse(s) => {
                let dense = s.to_dense();
                let gathered: Vec<f64> = indexer
                    .iter()
                    .map(|slot| slot.map_or(f64::NAN, |idx| dense[idx]))
                    .collect();
                BlockValues::Sparse(SparseData::from_dense(&gathered, s.fill))
            }
        };
        Ok(Self {
            values,
            placement: self.placement.clone(),
        })
    }

    /// Gather columns by storage offset. Contiguous ascending offsets stay
    /// zero-copy views; anything else copies.
    pub fn take_columns(&self, offsets: &[usize]) -> Result<Self, BlockError> {
        for &offset in offsets {
            if offset >= self.width() {
                return Err(BlockError::OutOfBounds {
                    index: offset,
                    len: self.width(),
                });
            }
        }
        let contiguous = !offsets.is_empty() && offsets.windows(2).all(|w| w[1] == w[0] + 1);
        if contiguous {
            return self.slice_columns(offsets[0], offsets.len());
        }

        let placement = self.placement.take(offsets);
        let values = match &self.values {
            BlockValues::Float64(d) => BlockValues::Float64(d.take_columns(offsets)),
            BlockValues::Int64(d) => BlockValues::Int64(d.take_columns(offsets)),
            BlockValues::Bool(d) => BlockValues::Bool(d.take_columns(offsets)),
            BlockValues::Object(d) => BlockValues::Object(d.take_columns(offsets)),
            BlockValues::DateTime(d) => BlockValues::DateTime(d.take_columns(offsets)),
            BlockValues::DateTimeTz { data, tz } => BlockValues::DateTimeTz {
                data: data.take_columns(offsets),
                tz: tz.clone(),
            },
            BlockValues::TimeDelta(d) => BlockValues::TimeDelta(d.take_columns(offsets)),
            BlockValues::Categorical { codes, categories } => BlockValues::Categorical {
                codes: codes.take_columns(offsets),
                categories: std::sync::Arc::clone(categories),
            },
            BlockValues::Sparse(s) => BlockValues::Sparse(s.clone()),
        };
        Self::new(values, placement)
    }

    /// Row shift by `periods` (positive shifts forward); vacated rows take
    /// the kind's missing marker, promoting when necessary.
    pub fn shift(&self, periods: i64) -> Result<Self, BlockError> {
        let rows = self.rows() as i64;
        let indexer: Vec<Option<usize>> = (0..rows)
            .map(|row| {
                let src = row - periods;
                (src >= 0 && src < rows).then_some(src as usize)
            })
            .collect();
        self.take_rows(&indexer)
    }

    /// Split around removed storage offsets, keeping maximal contiguous
    /// runs of surviving columns as zero-copy views.
    #[must_use]
    pub fn split_without_offsets(&self, removed: &[usize]) -> Vec<Self> {
        let mut keep_runs: Vec<(usize, usize)> = Vec::new();
        let mut run_start: Option<usize> = None;
        for offset in 0..self.width() {
            if removed.contains(&offset) {
                if let Some(start) = run_start.take() {
                    keep_runs.push((start, offset - start));
                }
            } else if run_start.is_none() {
                run_start = Some(offset);
            }
        }
        if let Some(start) = run_start {
            keep_runs.push((start, self.width() - start));
        }

        keep_runs
            .into_iter()
            .map(|(start, width)| {
                self.slice_columns(start, width)
                    .expect("run bounds are within the buffer")
            })
            .collect()
    }

    // ── kind conversion ────────────────────────────────────────────────

    /// Best-effort cast to `target`. Strict policy fails rather than lose
    /// information; object boxing always succeeds.
    pub fn astype(&self, target: Kind, policy: CastPolicy) -> Result<Self, BlockError> {
        if target == self.kind() {
            return Ok(self.clone());
        }
        if !target.can_consolidate() && self.width() != 1 {
            return Err(BlockError::NotConsolidatable { kind: target });
        }
        if target == Kind::DateTimeTz {
            // A bare kind carries no zone to attach.
            return Err(BlockError::Type(TypeError::InvalidCast {
                from: Some(self.kind()),
                to: target,
            }));
        }

        let mut columns = Vec::with_capacity(self.width());
        for offset in 0..self.width() {
            let mut scalars = self.column_scalars(offset);
            // Categorical construction derives its categories from the raw
            // values; per-scalar casting applies everywhere else.
            if target != Kind::Categorical {
                for value in &mut scalars {
                    *value = cast_scalar(value, target, policy)?;
                }
            }
            columns.push(scalars);
        }
        registry::block_of_kind(target, &columns, self.placement.clone())
    }

    /// Boxing external representation: every value as an owned scalar in
    /// an object buffer.
    #[must_use]
    pub fn to_object(&self) -> Self {
        let rows = self.rows();
        let mut out = Vec::with_capacity(rows * self.width());
        for offset in 0..self.width() {
            out.extend((0..rows).map(|row| self.scalar_at(row, offset)));
        }
        let data = TypedData {
            data: SharedVec::from_vec(out),
            rows,
            width: self.width(),
        };
        Self {
            values: BlockValues::Object(data),
            placement: self.placement.clone(),
        }
    }

    // ── missing-data operations ────────────────────────────────────────

    /// Replace missing entries with `value`. Kinds that cannot represent
    /// missingness have nothing to fill and return an unchanged copy;
    /// an unholdable fill value promotes per column.
    pub fn fillna(&self, value: &Scalar) -> Result<Vec<Self>, BlockError> {
        if value.is_missing() || !self.kind().can_hold_na() {
            return Ok(vec![self.clone()]);
        }

        if self.can_hold(value) {
            let mut out = self.clone();
            for offset in 0..self.width() {
                for row in 0..self.rows() {
                    if out.scalar_at(row, offset).is_missing() {
                        out.write_scalar(row, offset, value);
                    }
                }
            }
            return Ok(vec![out]);
        }

        self.split_and_promote(|scalars| {
            for slot in scalars.iter_mut() {
                if slot.is_missing() {
                    *slot = value.clone();
                }
            }
        }, value)
    }

    /// Masked assignment. Holdable values write in place (copy-on-write);
    /// incompatible values split the buffer into per-column promoted
    /// replacements.
    pub fn putmask(&self, mask: &[bool], value: &Scalar) -> Result<Vec<Self>, BlockError> {
        if mask.len() != self.rows() {
            return Err(BlockError::ShapeMismatch {
                expected: self.rows(),
                found: mask.len(),
            });
        }
        if !mask.iter().any(|&m| m) {
            return Ok(vec![self.clone()]);
        }

        if self.can_hold(value) {
            let mut out = self.clone();
            for offset in 0..self.width() {
                for (row, &hit) in mask.iter().enumerate() {
                    if hit {
                        out.write_scalar(row, offset, value);
                    }
                }
            }
            return Ok(vec![out]);
        }

        self.split_and_promote(|scalars| {
            for (slot, &hit) in scalars.iter_mut().zip(mask) {
                if hit {
                    *slot = value.clone();
                }
            }
        }, value)
    }

    /// The split-on-incompatibility escape hatch: apply `edit` to each
    /// column's materialized values and rebuild each column as its own
    /// buffer of the kind needed to hold `value`.
    fn split_and_promote(
        &self,
        edit: impl Fn(&mut Vec<Scalar>),
        value: &Scalar,
    ) -> Result<Vec<Self>, BlockError> {
        let target = fb_types::promote_for_scalar(self.kind(), value);
        let mut out = Vec::with_capacity(self.width());
        for offset in 0..self.width() {
            let mut scalars = self.column_scalars(offset);
            edit(&mut scalars);
            let placement = ColumnPlacement::single(self.placement.indices()[offset]);
            out.push(registry::block_of_kind(target, &[scalars], placement)?);
        }
        Ok(out)
    }

    // ── concatenation ──────────────────────────────────────────────────

    /// Concatenate same-kind buffers along the row axis. Kind (and
    /// kind-level metadata: timezone, categories, sparse fill) must match.
    pub fn concat_same_kind(blocks: &[&Self]) -> Result<Self, BlockError> {
        let first = blocks.first().ok_or(BlockError::ShapeMismatch {
            expected: 1,
            found: 0,
        })?;
        for block in &blocks[1..] {
            if block.kind() != first.kind() {
                return Err(BlockError::KindMismatch {
                    left: first.kind(),
                    right: block.kind(),
                });
            }
        }

        let values = match &first.values {
            BlockValues::Float64(_) => {
                BlockValues::Float64(concat_rows_of(blocks, |b| match &b.values {
                    BlockValues::Float64(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::Int64(_) => BlockValues::Int64(concat_rows_of(blocks, |b| match &b.values {
                BlockValues::Int64(d) => d,
                _ => unreachable!("kind checked above"),
            })?),
            BlockValues::Bool(_) => BlockValues::Bool(concat_rows_of(blocks, |b| match &b.values {
                BlockValues::Bool(d) => d,
                _ => unreachable!("kind checked above"),
            })?),
            BlockValues::Object(_) => {
                BlockValues::Object(concat_rows_of(blocks, |b| match &b.values {
                    BlockValues::Object(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::DateTime(_) => {
                BlockValues::DateTime(concat_rows_of(blocks, |b| match &b.values {
                    BlockValues::DateTime(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::TimeDelta(_) => {
                BlockValues::TimeDelta(concat_rows_of(blocks, |b| match &b.values {
                    BlockValues::TimeDelta(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::DateTimeTz { tz, .. } => {
                for block in &blocks[1..] {
                    let BlockValues::DateTimeTz { tz: other, .. } = &block.values else {
                        unreachable!("kind checked above");
                    };
                    if other != tz {
                        return Err(BlockError::KindMismatch {
                            left: Kind::DateTimeTz,
                            right: Kind::DateTimeTz,
                        });
                    }
                }
                BlockValues::DateTimeTz {
                    data: concat_rows_of(blocks, |b| match &b.values {
                        BlockValues::DateTimeTz { data, .. } => data,
                        _ => unreachable!("kind checked above"),
                    })?,
                    tz: tz.clone(),
                }
            }
            BlockValues::Categorical { categories, .. } => {
                for block in &blocks[1..] {
                    let BlockValues::Categorical {
                        categories: other, ..
                    } = &block.values
                    else {
                        unreachable!("kind checked above");
                    };
                    if other.as_slice() != categories.as_slice() {
                        return Err(BlockError::KindMismatch {
                            left: Kind::Categorical,
                            right: Kind::Categorical,
                        });
                    }
                }
                BlockValues::Categorical {
                    codes: concat_rows_of(blocks, |b| match &b.values {
                        BlockValues::Categorical { codes, .. } => codes,
                        _ => unreachable!("kind checked above"),
                    })?,
                    categories: std::sync::Arc::clone(categories),
                }
            }
            BlockValues::Sparse(first_sparse) => {
                let mut dense = Vec::new();
                for block in blocks {
                    let BlockValues::Sparse(s) = &block.values else {
                        unreachable!("kind checked above");
                    };
                    if !s.same_fill(first_sparse) {
                        return Err(BlockError::KindMismatch {
                            left: Kind::Sparse,
                            right: Kind::Sparse,
                        });
                    }
                    dense.extend(s.to_dense());
                }
                BlockValues::Sparse(SparseData::from_dense(&dense, first_sparse.fill))
            }
        };
        Self::new(values, first.placement.clone())
    }

    /// Merge same-kind consolidatable buffers along the column axis;
    /// column-major payloads concatenate without per-element work.
    pub fn merge_same_kind(blocks: &[&Self]) -> Result<Self, BlockError> {
        let first = blocks.first().ok_or(BlockError::ShapeMismatch {
            expected: 1,
            found: 0,
        })?;
        if !first.kind().can_consolidate() {
            return Err(BlockError::NotConsolidatable { kind: first.kind() });
        }
        for block in &blocks[1..] {
            if block.kind() != first.kind() {
                return Err(BlockError::KindMismatch {
                    left: first.kind(),
                    right: block.kind(),
                });
            }
        }

        let mut placement = ColumnPlacement::new(Vec::new());
        for block in blocks {
            for &slot in block.placement.indices() {
                placement.push(slot);
            }
        }

        let values = match &first.values {
            BlockValues::Float64(_) => {
                BlockValues::Float64(concat_columns_of(blocks, |b| match &b.values {
                    BlockValues::Float64(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::Int64(_) => {
                BlockValues::Int64(concat_columns_of(blocks, |b| match &b.values {
                    BlockValues::Int64(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::Bool(_) => {
                BlockValues::Bool(concat_columns_of(blocks, |b| match &b.values {
                    BlockValues::Bool(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::Object(_) => {
                BlockValues::Object(concat_columns_of(blocks, |b| match &b.values {
                    BlockValues::Object(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::DateTime(_) => {
                BlockValues::DateTime(concat_columns_of(blocks, |b| match &b.values {
                    BlockValues::DateTime(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::TimeDelta(_) => {
                BlockValues::TimeDelta(concat_columns_of(blocks, |b| match &b.values {
                    BlockValues::TimeDelta(d) => d,
                    _ => unreachable!("kind checked above"),
                })?)
            }
            BlockValues::DateTimeTz { .. }
            | BlockValues::Categorical { .. }
            | BlockValues::Sparse(_) => {
                return Err(BlockError::NotConsolidatable { kind: first.kind() });
            }
        };
        Self::new(values, placement)
    }
}

fn concat_rows_of<'a, T: Clone + 'a>(
    blocks: &'a [&Block],
    pick: impl Fn(&'a Block) -> &'a TypedData<T>,
) -> Result<TypedData<T>, BlockError> {
    let parts: Vec<&TypedData<T>> = blocks.iter().map(|b| pick(b)).collect();
    TypedData::concat_rows(&parts)
}

fn concat_columns_of<'a, T: Clone + 'a>(
    blocks: &'a [&Block],
    pick: impl Fn(&'a Block) -> &'a TypedData<T>,
) -> Result<TypedData<T>, BlockError> {
    let parts: Vec<&TypedData<T>> = blocks.iter().map(|b| pick(b)).collect();
    TypedData::concat_columns(&parts)
}

#[cfg(test)]
mod tests {
    use fb_types::{CastPolicy, Kind, NAT, NullKind, Scalar};

    use super::{Block, BlockValues, ColumnPlacement, SparseData, TypedData, TzInfo};

    fn int_block(columns: &[&[i64]], slots: &[usize]) -> Block {
        let mut data = Vec::new();
        for column in columns {
            data.extend_from_slice(column);
        }
        let rows = columns.first().map_or(0, |c| c.len());
        let typed = TypedData::new(super::SharedVec::from_vec(data), rows, columns.len())
            .expect("shape is consistent");
        Block::new(
            BlockValues::Int64(typed),
            ColumnPlacement::new(slots.to_vec()),
        )
        .expect("placement covers width")
    }

    fn float_block(columns: &[&[f64]], slots: &[usize]) -> Block {
        let mut data = Vec::new();
        for column in columns {
            data.extend_from_slice(column);
        }
        let rows = columns.first().map_or(0, |c| c.len());
        let typed = TypedData::new(super::SharedVec::from_vec(data), rows, columns.len())
            .expect("shape is consistent");
        Block::new(
            BlockValues::Float64(typed),
            ColumnPlacement::new(slots.to_vec()),
        )
        .expect("placement covers width")
    }

    #[test]
    fn placement_must_cover_width() {
        let typed = TypedData::from_column(vec![1_i64, 2]);
        let err = Block::new(BlockValues::Int64(typed), ColumnPlacement::new(vec![0, 1]))
            .expect_err("one column cannot fill two slots");
        assert_eq!(
            err.to_string(),
            "placement of 2 slots does not cover buffer width 1"
        );
    }

    #[test]
    fn slice_preserves_kind_and_shares_storage() {
        let block = int_block(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]], &[0, 1, 2]);
        let slice = block.slice_columns(1, 2).expect("in range");
        assert_eq!(slice.kind(), Kind::Int64);
        assert_eq!(slice.width(), 2);
        assert!(slice.is_view(), "column slices never copy");
        assert_eq!(slice.placement().indices(), &[1, 2]);
        assert_eq!(slice.column_scalars(0), vec![
            Scalar::Int64(4),
            Scalar::Int64(5),
            Scalar::Int64(6),
        ]);
    }

    #[test]
    fn row_slice_of_single_column_is_view() {
        let block = float_block(&[&[1.0, 2.0, 3.0, 4.0]], &[0]);
        let sliced = block.slice_rows(1, 2);
        assert!(sliced.is_view());
        assert_eq!(sliced.kind(), Kind::Float64);
        assert_eq!(sliced.column_scalars(0), vec![
            Scalar::Float64(2.0),
            Scalar::Float64(3.0),
        ]);
    }

    #[test]
    fn take_with_missing_sentinel_fills_nan() {
        let block = float_block(&[&[1.0, 2.0, 3.0]], &[0]);
        let taken = block.take_rows(&[Some(0), None, Some(2)]).expect("in range");
        let values = taken.column_scalars(0);
        assert_eq!(values[0], Scalar::Float64(1.0));
        assert!(values[1].is_missing());
        assert_eq!(values[2], Scalar::Float64(3.0));
    }

    #[test]
    fn take_with_missing_promotes_int_to_float() {
        let block = int_block(&[&[10, 20, 30]], &[0]);
        let taken = block.take_rows(&[Some(1), None]).expect("in range");
        assert_eq!(taken.kind(), Kind::Float64);
        let values = taken.column_scalars(0);
        assert_eq!(values[0], Scalar::Float64(20.0));
        assert!(values[1].is_missing());
    }

    #[test]
    fn take_out_of_range_is_an_error() {
        let block = int_block(&[&[1, 2]], &[0]);
        block.take_rows(&[Some(5)]).expect_err("must reject");
    }

    #[test]
    fn astype_strict_rejects_fractional_floats() {
        let block = float_block(&[&[1.5, 2.0]], &[0]);
        block
            .astype(Kind::Int64, CastPolicy::Strict)
            .expect_err("1.5 does not fit int64");
        let lossy = block
            .astype(Kind::Int64, CastPolicy::Lossy)
            .expect("lossy truncates");
        assert_eq!(lossy.column_scalars(0), vec![Scalar::Int64(1), Scalar::Int64(2)]);
    }

    #[test]
    fn astype_to_object_boxes_datetimes() {
        let typed = TypedData::from_column(vec![5_i64, NAT]);
        let block = Block::new(BlockValues::DateTime(typed), ColumnPlacement::single(0))
            .expect("block builds");
        let boxed = block
            .astype(Kind::Object, CastPolicy::Strict)
            .expect("boxing always succeeds");
        assert_eq!(boxed.kind(), Kind::Object);
        assert_eq!(boxed.column_scalars(0)[0], Scalar::DateTime(5));
        assert!(boxed.column_scalars(0)[1].is_missing());
    }

    #[test]
    fn fillna_on_int_is_a_noop_copy() {
        let block = int_block(&[&[1, 2]], &[0]);
        let filled = block.fillna(&Scalar::Int64(0)).expect("fillna passes");
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].kind(), Kind::Int64);
        assert_eq!(filled[0].column_scalars(0), block.column_scalars(0));
    }

    #[test]
    fn fillna_replaces_nan_in_place_kind() {
        let block = float_block(&[&[1.0, f64::NAN, 3.0]], &[0]);
        let filled = block.fillna(&Scalar::Float64(9.0)).expect("fillna passes");
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].column_scalars(0), vec![
            Scalar::Float64(1.0),
            Scalar::Float64(9.0),
            Scalar::Float64(3.0),
        ]);
    }

    #[test]
    fn fillna_with_unholdable_value_promotes_to_object() {
        let block = float_block(&[&[1.0, f64::NAN]], &[0]);
        let filled = block
            .fillna(&Scalar::Utf8("missing".to_owned()))
            .expect("promoting fill passes");
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].kind(), Kind::Object);
        assert_eq!(
            filled[0].column_scalars(0)[1],
            Scalar::Utf8("missing".to_owned())
        );
    }

    #[test]
    fn putmask_in_place_respects_copy_on_write() {
        let block = float_block(&[&[1.0, 2.0, 3.0]], &[0]);
        let shared = block.clone();
        let out = block
            .putmask(&[false, true, false], &Scalar::Float64(99.0))
            .expect("holdable putmask");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].column_scalars(0)[1], Scalar::Float64(99.0));
        // The sibling clone still sees the original data.
        assert_eq!(shared.column_scalars(0)[1], Scalar::Float64(2.0));
    }

    #[test]
    fn putmask_incompatible_value_splits_per_column() {
        let block = int_block(&[&[1, 2], &[3, 4]], &[0, 1]);
        let out = block
            .putmask(&[true, false], &Scalar::Float64(0.5))
            .expect("splitting putmask");
        assert_eq!(out.len(), 2, "each column becomes its own buffer");
        for (block, slot) in out.iter().zip([0_usize, 1]) {
            assert_eq!(block.kind(), Kind::Float64);
            assert_eq!(block.placement().indices(), &[slot]);
            assert_eq!(block.column_scalars(0)[0], Scalar::Float64(0.5));
        }
        assert_eq!(out[1].column_scalars(0)[1], Scalar::Float64(4.0));
    }

    #[test]
    fn putmask_without_hits_is_a_noop() {
        let block = int_block(&[&[1, 2]], &[0]);
        let out = block
            .putmask(&[false, false], &Scalar::Float64(0.5))
            .expect("no-op putmask");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), Kind::Int64);
    }

    #[test]
    fn split_without_offsets_keeps_contiguous_views() {
        let block = int_block(&[&[1], &[2], &[3], &[4]], &[0, 1, 2, 3]);
        let parts = block.split_without_offsets(&[1]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].placement().indices(), &[0]);
        assert_eq!(parts[1].placement().indices(), &[2, 3]);
        assert!(parts[0].is_view() && parts[1].is_view());
    }

    #[test]
    fn split_removing_everything_yields_nothing() {
        let block = int_block(&[&[1], &[2]], &[0, 1]);
        assert!(block.split_without_offsets(&[0, 1]).is_empty());
    }

    #[test]
    fn concat_same_kind_stacks_rows() {
        let a = int_block(&[&[1, 2]], &[0]);
        let b = int_block(&[&[3]], &[0]);
        let joined = Block::concat_same_kind(&[&a, &b]).expect("kinds match");
        assert_eq!(joined.rows(), 3);
        assert_eq!(joined.column_scalars(0), vec![
            Scalar::Int64(1),
            Scalar::Int64(2),
            Scalar::Int64(3),
        ]);
    }

    #[test]
    fn concat_same_kind_rejects_mixed_kinds() {
        let a = int_block(&[&[1]], &[0]);
        let b = float_block(&[&[1.0]], &[0]);
        Block::concat_same_kind(&[&a, &b]).expect_err("kind mismatch");
    }

    #[test]
    fn merge_same_kind_concatenates_placements() {
        let a = int_block(&[&[1, 2]], &[0]);
        let b = int_block(&[&[3, 4], &[5, 6]], &[2, 3]);
        let merged = Block::merge_same_kind(&[&a, &b]).expect("merge passes");
        assert_eq!(merged.width(), 3);
        assert_eq!(merged.placement().indices(), &[0, 2, 3]);
        assert_eq!(merged.column_scalars(1), vec![Scalar::Int64(3), Scalar::Int64(4)]);
    }

    #[test]
    fn tz_blocks_are_single_column() {
        let typed = TypedData::new(super::SharedVec::from_vec(vec![1_i64, 2, 3, 4]), 2, 2)
            .expect("shape consistent");
        let err = Block::new(
            BlockValues::DateTimeTz {
                data: typed,
                tz: TzInfo {
                    name: "UTC+1".to_owned(),
                    offset_minutes: 60,
                },
            },
            ColumnPlacement::new(vec![0, 1]),
        )
        .expect_err("tz buffers stay single-column");
        assert_eq!(err.to_string(), "DateTimeTz buffers are single-column");
    }

    #[test]
    fn concat_tz_requires_matching_zone() {
        let make = |name: &str, minutes| {
            Block::new(
                BlockValues::DateTimeTz {
                    data: TypedData::from_column(vec![1_i64]),
                    tz: TzInfo {
                        name: name.to_owned(),
                        offset_minutes: minutes,
                    },
                },
                ColumnPlacement::single(0),
            )
            .expect("block builds")
        };
        let utc = make("UTC", 0);
        let shifted = make("UTC+1", 60);
        Block::concat_same_kind(&[&utc, &shifted]).expect_err("zones differ");
        Block::concat_same_kind(&[&utc, &utc.clone()]).expect("zones match");
    }

    #[test]
    fn categorical_holds_only_member_values() {
        let categories = std::sync::Arc::new(vec![
            Scalar::Utf8("red".to_owned()),
            Scalar::Utf8("blue".to_owned()),
        ]);
        let block = Block::new(
            BlockValues::Categorical {
                codes: TypedData::from_column(vec![0, 1, -1]),
                categories,
            },
            ColumnPlacement::single(0),
        )
        .expect("block builds");

        assert!(block.can_hold(&Scalar::Utf8("red".to_owned())));
        assert!(!block.can_hold(&Scalar::Utf8("green".to_owned())));
        assert!(block.can_hold(&Scalar::Null(NullKind::Null)));
        assert_eq!(block.column_scalars(0)[1], Scalar::Utf8("blue".to_owned()));
        assert!(block.column_scalars(0)[2].is_missing());
    }

    #[test]
    fn sparse_round_trips_through_dense() {
        let sparse = SparseData::from_dense(&[0.0, 5.0, 0.0, 7.0], 0.0);
        assert_eq!(sparse.to_dense(), vec![0.0, 5.0, 0.0, 7.0]);
        assert!((sparse.density() - 0.5).abs() < 1e-12);
        assert_eq!(sparse.get(3), 7.0);
        assert_eq!(sparse.get(2), 0.0);
    }

    #[test]
    fn shift_vacates_rows_with_missing() {
        let block = float_block(&[&[1.0, 2.0, 3.0]], &[0]);
        let shifted = block.shift(1).expect("shift passes");
        let values = shifted.column_scalars(0);
        assert!(values[0].is_missing());
        assert_eq!(values[1], Scalar::Float64(1.0));
        assert_eq!(values[2], Scalar::Float64(2.0));
    }

    #[test]
    fn get_value_is_bounds_checked() {
        let block = int_block(&[&[1, 2], &[3, 4]], &[0, 1]);
        assert_eq!(block.get_value(1, 1).expect("in range"), Scalar::Int64(4));
        block.get_value(2, 0).expect_err("row out of range");
        block.get_value(0, 2).expect_err("column out of range");
    }

    #[test]
    fn to_object_boxes_every_column() {
        let block = int_block(&[&[1, 2], &[3, 4]], &[0, 1]);
        let boxed = block.to_object();
        assert_eq!(boxed.kind(), Kind::Object);
        assert_eq!(boxed.width(), 2);
        assert_eq!(boxed.placement().indices(), block.placement().indices());
        assert_eq!(boxed.column_scalars(1), vec![Scalar::Int64(3), Scalar::Int64(4)]);
    }

    #[test]
    fn set_value_requires_holdability() {
        let mut block = int_block(&[&[1, 2]], &[0]);
        block
            .set_value(0, 0, &Scalar::Float64(0.5))
            .expect_err("int cannot hold 0.5");
        block
            .set_value(0, 0, &Scalar::Float64(7.0))
            .expect("integral float fits");
        assert_eq!(block.column_scalars(0)[0], Scalar::Int64(7));
    }
}
