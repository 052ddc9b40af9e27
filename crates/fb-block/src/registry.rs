//! Kind dispatch: the factory that turns inbound column data into concrete
//! typed buffers, groups same-kind columns at construction time, and
//! rebuilds buffers from their raw serialized payloads. Stateless.

use std::sync::Arc;

use fb_types::{CastPolicy, Kind, NAT, NullKind, Scalar, cast_scalar_owned, infer_kind};
use serde::{Deserialize, Serialize};

use crate::{
    Block, BlockError, BlockValues, ColumnPlacement, SharedVec, SparseData, TypedData, TzInfo,
};

/// Inbound single-column data, as handed over by construction or loading
/// code. Typed variants pass straight through to a matching buffer;
/// `Mixed` goes through kind inference first.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnArray {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
    Utf8(Vec<Option<String>>),
    DateTime(Vec<i64>),
    TimeDelta(Vec<i64>),
    DateTimeTz(Vec<i64>, TzInfo),
    Categorical(Vec<i32>, Vec<Scalar>),
    Sparse(Vec<f64>, f64),
    Mixed(Vec<Scalar>),
}

impl ColumnArray {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) | Self::Sparse(v, _) => v.len(),
            Self::Int64(v) | Self::DateTime(v) | Self::TimeDelta(v) | Self::DateTimeTz(v, _) => {
                v.len()
            }
            Self::Bool(v) => v.len(),
            Self::Utf8(v) => v.len(),
            Self::Categorical(codes, _) => codes.len(),
            Self::Mixed(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The kind a scalar column will be stored as, widening when the values
/// contain missing entries a narrow kind cannot represent.
#[must_use]
pub fn kind_for_scalars(values: &[Scalar]) -> Kind {
    let inferred = infer_kind(values);
    if inferred.can_hold_na() || !values.iter().any(Scalar::is_missing) {
        return inferred;
    }
    match inferred {
        Kind::Int64 => Kind::Float64,
        _ => Kind::Object,
    }
}

/// Build one single-column buffer for `array`, assigned to logical slot
/// `slot`. Typed inputs keep their representation; no element is copied
/// through a scalar detour.
pub fn make_block(array: ColumnArray, slot: usize) -> Result<Block, BlockError> {
    let placement = ColumnPlacement::single(slot);
    let values = match array {
        ColumnArray::Float64(v) => BlockValues::Float64(TypedData::from_column(v)),
        ColumnArray::Int64(v) => BlockValues::Int64(TypedData::from_column(v)),
        ColumnArray::Bool(v) => BlockValues::Bool(TypedData::from_column(v)),
        ColumnArray::Utf8(v) => BlockValues::Object(TypedData::from_column(
            v.into_iter()
                .map(|s| s.map_or(Scalar::Null(NullKind::Null), Scalar::Utf8))
                .collect(),
        )),
        ColumnArray::DateTime(v) => BlockValues::DateTime(TypedData::from_column(v)),
        ColumnArray::TimeDelta(v) => BlockValues::TimeDelta(TypedData::from_column(v)),
        ColumnArray::DateTimeTz(v, tz) => BlockValues::DateTimeTz {
            data: TypedData::from_column(v),
            tz,
        },
        ColumnArray::Categorical(codes, categories) => {
            let bound = categories.len() as i32;
            if let Some(&bad) = codes.iter().find(|&&c| c >= bound) {
                return Err(BlockError::OutOfBounds {
                    index: bad as usize,
                    len: categories.len(),
                });
            }
            BlockValues::Categorical {
                codes: TypedData::from_column(codes),
                categories: Arc::new(categories),
            }
        }
        ColumnArray::Sparse(dense, fill) => {
            BlockValues::Sparse(SparseData::from_dense(&dense, fill))
        }
        ColumnArray::Mixed(v) => {
            let kind = kind_for_scalars(&v);
            return block_of_kind(kind, &[v], placement);
        }
    };
    Block::new(values, placement)
}

/// Build a buffer of an explicit kind from materialized scalar columns.
/// The caller is responsible for having promoted the kind far enough to
/// hold every value; narrow kinds reject missing entries here.
pub fn block_of_kind(
    kind: Kind,
    columns: &[Vec<Scalar>],
    placement: ColumnPlacement,
) -> Result<Block, BlockError> {
    let rows = columns.first().map_or(0, Vec::len);
    for column in columns {
        if column.len() != rows {
            return Err(BlockError::ShapeMismatch {
                expected: rows,
                found: column.len(),
            });
        }
    }

    let values = match kind {
        Kind::Float64 => BlockValues::Float64(typed_columns(columns, rows, |v| match v {
            Scalar::Float64(x) => Ok(*x),
            Scalar::Int64(x) => Ok(*x as f64),
            Scalar::Bool(x) => Ok(f64::from(u8::from(*x))),
            v if v.is_missing() => Ok(f64::NAN),
            v => Err(cast_failure(v, Kind::Float64)),
        })?),
        Kind::Int64 => BlockValues::Int64(typed_columns(columns, rows, |v| {
            match cast_scalar_owned(v.clone(), Kind::Int64, CastPolicy::Strict)? {
                Scalar::Int64(x) => Ok(x),
                other => Err(cast_failure(&other, Kind::Int64)),
            }
        })?),
        Kind::Bool => BlockValues::Bool(typed_columns(columns, rows, |v| match v {
            Scalar::Bool(x) => Ok(*x),
            v => Err(cast_failure(v, Kind::Bool)),
        })?),
        Kind::Object => BlockValues::Object(typed_columns(columns, rows, |v| {
            Ok::<_, BlockError>(v.clone())
        })?),
        Kind::DateTime => BlockValues::DateTime(typed_columns(columns, rows, |v| match v {
            Scalar::DateTime(x) => Ok(*x),
            v if v.is_missing() => Ok(NAT),
            v => Err(cast_failure(v, Kind::DateTime)),
        })?),
        Kind::TimeDelta => BlockValues::TimeDelta(typed_columns(columns, rows, |v| match v {
            Scalar::TimeDelta(x) => Ok(*x),
            v if v.is_missing() => Ok(NAT),
            v => Err(cast_failure(v, Kind::TimeDelta)),
        })?),
        Kind::DateTimeTz => {
            return Err(BlockError::Type(fb_types::TypeError::InvalidCast {
                from: None,
                to: Kind::DateTimeTz,
            }));
        }
        Kind::Categorical => {
            let [column] = columns else {
                return Err(BlockError::NotConsolidatable {
                    kind: Kind::Categorical,
                });
            };
            let mut categories: Vec<Scalar> = Vec::new();
            let codes: Vec<i32> = column
                .iter()
                .map(|v| {
                    if v.is_missing() {
                        return -1;
                    }
                    match categories.iter().position(|c| c == v) {
                        Some(code) => code as i32,
                        None => {
                            categories.push(v.clone());
                            (categories.len() - 1) as i32
                        }
                    }
                })
                .collect();
            BlockValues::Categorical {
                codes: TypedData::from_column(codes),
                categories: Arc::new(categories),
            }
        }
        Kind::Sparse => {
            let [column] = columns else {
                return Err(BlockError::NotConsolidatable { kind: Kind::Sparse });
            };
            let dense = column
                .iter()
                .map(|v| {
                    if v.is_missing() {
                        Ok(f64::NAN)
                    } else {
                        v.to_f64().map_err(BlockError::Type)
                    }
                })
                .collect::<Result<Vec<f64>, _>>()?;
            BlockValues::Sparse(SparseData::from_dense(&dense, f64::NAN))
        }
    };
    Block::new(values, placement)
}

fn cast_failure(value: &Scalar, to: Kind) -> BlockError {
    BlockError::Type(fb_types::TypeError::InvalidCast {
        from: value.kind(),
        to,
    })
}

fn typed_columns<T: Clone>(
    columns: &[Vec<Scalar>],
    rows: usize,
    convert: impl Fn(&Scalar) -> Result<T, BlockError>,
) -> Result<TypedData<T>, BlockError> {
    let mut out = Vec::with_capacity(rows * columns.len());
    for column in columns {
        for value in column {
            out.push(convert(value)?);
        }
    }
    TypedData::new(SharedVec::from_vec(out), rows, columns.len())
}

/// A constant column: `rows` copies of `value` stored as `kind`, used to
/// synthesize fill buffers for labels introduced by reindexing.
pub fn fill_block(
    kind: Kind,
    rows: usize,
    value: &Scalar,
    slot: usize,
) -> Result<Block, BlockError> {
    block_of_kind(
        kind,
        &[vec![value.clone(); rows]],
        ColumnPlacement::single(slot),
    )
}

/// Group inbound columns into buffers: consolidatable kinds are gathered
/// into one buffer per kind, the rest stay single-column. Column order is
/// encoded in the placements, not in buffer order.
pub fn form_blocks(arrays: Vec<ColumnArray>) -> Result<Vec<Block>, BlockError> {
    let mut singles: Vec<Block> = Vec::new();
    let mut grouped: Vec<(Kind, Vec<Block>)> = Vec::new();

    for (slot, array) in arrays.into_iter().enumerate() {
        let block = make_block(array, slot)?;
        if block.kind().can_consolidate() {
            match grouped.iter_mut().find(|(kind, _)| *kind == block.kind()) {
                Some((_, group)) => group.push(block),
                None => grouped.push((block.kind(), vec![block])),
            }
        } else {
            singles.push(block);
        }
    }

    let mut out = Vec::with_capacity(grouped.len() + singles.len());
    for (_, group) in grouped {
        if group.len() == 1 {
            out.extend(group);
        } else {
            let refs: Vec<&Block> = group.iter().collect();
            out.push(Block::merge_same_kind(&refs)?);
        }
    }
    out.extend(singles);
    Ok(out)
}

// ── raw serialized representation ──────────────────────────────────────

/// Kind-specific raw payload of one buffer. The persisted layout is
/// `(kind, placement, payload)`; reconstruction goes back through this
/// factory so the payload encoding can never drift from construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RawPayload {
    /// Floats travel as `Option<f64>` with `None` for NaN: JSON cannot
    /// represent NaN, and NaN is this kind's missing marker anyway.
    Float64(Vec<Option<f64>>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
    Object(Vec<Scalar>),
    DateTime(Vec<i64>),
    DateTimeTz { values: Vec<i64>, tz: TzInfo },
    TimeDelta(Vec<i64>),
    Categorical { codes: Vec<i32>, categories: Vec<Scalar> },
    Sparse {
        positions: Vec<u32>,
        values: Vec<Option<f64>>,
        fill: Option<f64>,
        len: usize,
    },
}

fn encode_floats(values: Vec<f64>) -> Vec<Option<f64>> {
    values
        .into_iter()
        .map(|v| if v.is_nan() { None } else { Some(v) })
        .collect()
}

fn decode_floats(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub placement: Vec<usize>,
    pub rows: usize,
    pub payload: RawPayload,
}

impl Block {
    #[must_use]
    pub fn to_raw(&self) -> RawBlock {
        let payload = match self.values() {
            BlockValues::Float64(d) => RawPayload::Float64(encode_floats(flatten(d))),
            BlockValues::Int64(d) => RawPayload::Int64(flatten(d)),
            BlockValues::Bool(d) => RawPayload::Bool(flatten(d)),
            BlockValues::Object(d) => RawPayload::Object(flatten(d)),
            BlockValues::DateTime(d) => RawPayload::DateTime(flatten(d)),
            BlockValues::DateTimeTz { data, tz } => RawPayload::DateTimeTz {
                values: flatten(data),
                tz: tz.clone(),
            },
            BlockValues::TimeDelta(d) => RawPayload::TimeDelta(flatten(d)),
            BlockValues::Categorical { codes, categories } => RawPayload::Categorical {
                codes: flatten(codes),
                categories: categories.as_ref().clone(),
            },
            BlockValues::Sparse(s) => RawPayload::Sparse {
                positions: s.positions.to_vec(),
                values: encode_floats(s.values.to_vec()),
                fill: if s.fill().is_nan() { None } else { Some(s.fill()) },
                len: s.len(),
            },
        };
        RawBlock {
            placement: self.placement().indices().to_vec(),
            rows: self.rows(),
            payload,
        }
    }

    pub fn from_raw(raw: RawBlock) -> Result<Self, BlockError> {
        let placement = ColumnPlacement::new(raw.placement);
        let width = placement.len();
        let rows = raw.rows;
        let values = match raw.payload {
            RawPayload::Float64(v) => BlockValues::Float64(TypedData::new(
                SharedVec::from_vec(decode_floats(v)),
                rows,
                width,
            )?),
            RawPayload::Int64(v) => {
                BlockValues::Int64(TypedData::new(SharedVec::from_vec(v), rows, width)?)
            }
            RawPayload::Bool(v) => {
                BlockValues::Bool(TypedData::new(SharedVec::from_vec(v), rows, width)?)
            }
            RawPayload::Object(v) => {
                BlockValues::Object(TypedData::new(SharedVec::from_vec(v), rows, width)?)
            }
            RawPayload::DateTime(v) => {
                BlockValues::DateTime(TypedData::new(SharedVec::from_vec(v), rows, width)?)
            }
            RawPayload::DateTimeTz { values, tz } => BlockValues::DateTimeTz {
                data: TypedData::new(SharedVec::from_vec(values), rows, width)?,
                tz,
            },
            RawPayload::TimeDelta(v) => {
                BlockValues::TimeDelta(TypedData::new(SharedVec::from_vec(v), rows, width)?)
            }
            RawPayload::Categorical { codes, categories } => BlockValues::Categorical {
                codes: TypedData::new(SharedVec::from_vec(codes), rows, width)?,
                categories: Arc::new(categories),
            },
            RawPayload::Sparse {
                positions,
                values,
                fill,
                len,
            } => {
                if positions.len() != values.len() {
                    return Err(BlockError::ShapeMismatch {
                        expected: positions.len(),
                        found: values.len(),
                    });
                }
                BlockValues::Sparse(SparseData {
                    positions: SharedVec::from_vec(positions),
                    values: SharedVec::from_vec(decode_floats(values)),
                    fill: fill.unwrap_or(f64::NAN),
                    len,
                })
            }
        };
        Self::new(values, placement)
    }
}

fn flatten<T: Clone>(data: &TypedData<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(data.rows() * data.width());
    for offset in 0..data.width() {
        out.extend_from_slice(data.column_slice(offset));
    }
    out
}
