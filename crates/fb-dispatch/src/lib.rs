#![forbid(unsafe_code)]

//! Elementwise dispatch over two labeled collections: align both axes,
//! run per-column kernels with typed fast paths, and reassemble through
//! the kind-dispatch factory.

use fb_block::registry::ColumnArray;
use fb_index::{JoinHow, join};
use fb_manager::{Axis, BlockCollection, CollectionError};
use fb_types::{Kind, NullKind, Scalar, TypeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gt,
    Lt,
    Eq,
    Ne,
    Ge,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOp {
    And,
    Or,
    Xor,
}

/// Per-call dispatch policy. Lenient mode degrades kind-incompatible
/// column pairs to all-missing object columns instead of failing; strict
/// mode surfaces the error. `fill_value` patches alignment holes before
/// the kernel runs.
#[derive(Debug, Clone, PartialEq)]
pub struct OpPolicy {
    pub strict: bool,
    pub join: JoinHow,
    pub fill_value: Option<Scalar>,
}

impl Default for OpPolicy {
    fn default() -> Self {
        Self {
            strict: false,
            join: JoinHow::Outer,
            fill_value: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("operands have incompatible kinds {left:?} and {right:?}")]
    IncompatibleOperands { left: Kind, right: Kind },
    #[error("boolean operations require bool columns, found {0:?}")]
    NotBoolean(Kind),
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Align both axes of two collections under the policy's join mode.
pub fn align_collections(
    left: &BlockCollection,
    right: &BlockCollection,
    policy: &OpPolicy,
) -> Result<(BlockCollection, BlockCollection), DispatchError> {
    let fill = policy.fill_value.as_ref();

    let row_plan = join(left.row_axis(), right.row_axis(), policy.join);
    let col_plan = join(left.col_axis(), right.col_axis(), policy.join);

    let left_rows = left.reindex_axis(&row_plan.joined, Axis::Rows, fill, false)?;
    let right_rows = right.reindex_axis(&row_plan.joined, Axis::Rows, fill, false)?;
    let left_full = left_rows.reindex_axis(&col_plan.joined, Axis::Columns, fill, false)?;
    let right_full = right_rows.reindex_axis(&col_plan.joined, Axis::Columns, fill, false)?;
    Ok((left_full, right_full))
}

/// Elementwise arithmetic between two collections.
pub fn arith(
    left: &BlockCollection,
    right: &BlockCollection,
    op: ArithmeticOp,
    policy: &OpPolicy,
) -> Result<BlockCollection, DispatchError> {
    let (left, right) = align_collections(left, right, policy)?;
    let mut columns = Vec::with_capacity(left.ncols());
    for position in 0..left.ncols() {
        let label = left.col_axis().labels()[position].clone();
        let array = arith_columns(
            &left.column_scalars(position),
            &right.column_scalars(position),
            left.column_kind(position),
            right.column_kind(position),
            op,
            policy.strict,
        )?;
        columns.push((label, array));
    }
    Ok(BlockCollection::from_columns(columns, left.row_axis().clone())?)
}

/// Elementwise arithmetic against a scalar (no alignment involved).
pub fn arith_scalar(
    left: &BlockCollection,
    value: &Scalar,
    op: ArithmeticOp,
    policy: &OpPolicy,
) -> Result<BlockCollection, DispatchError> {
    let mut columns = Vec::with_capacity(left.ncols());
    for position in 0..left.ncols() {
        let scalars = left.column_scalars(position);
        let broadcast = vec![value.clone(); scalars.len()];
        let value_kind = value.kind().unwrap_or(Kind::Float64);
        let label = left.col_axis().labels()[position].clone();
        let array = arith_columns(
            &scalars,
            &broadcast,
            left.column_kind(position),
            value_kind,
            op,
            policy.strict,
        )?;
        columns.push((label, array));
    }
    Ok(BlockCollection::from_columns(columns, left.row_axis().clone())?)
}

/// Elementwise comparison; results are bool columns, widening to object
/// where missing inputs propagate missing outputs.
pub fn compare(
    left: &BlockCollection,
    right: &BlockCollection,
    op: ComparisonOp,
    policy: &OpPolicy,
) -> Result<BlockCollection, DispatchError> {
    let (left, right) = align_collections(left, right, policy)?;
    let mut columns = Vec::with_capacity(left.ncols());
    for position in 0..left.ncols() {
        let label = left.col_axis().labels()[position].clone();
        let lhs = left.column_scalars(position);
        let rhs = right.column_scalars(position);
        let values = lhs
            .iter()
            .zip(rhs.iter())
            .map(|(a, b)| compare_values(a, b, op, policy.strict))
            .collect::<Result<Vec<_>, _>>()?;
        columns.push((label, ColumnArray::Mixed(values)));
    }
    Ok(BlockCollection::from_columns(columns, left.row_axis().clone())?)
}

/// Compare every element against one scalar.
pub fn compare_scalar(
    left: &BlockCollection,
    value: &Scalar,
    op: ComparisonOp,
    policy: &OpPolicy,
) -> Result<BlockCollection, DispatchError> {
    let mut columns = Vec::with_capacity(left.ncols());
    for position in 0..left.ncols() {
        let label = left.col_axis().labels()[position].clone();
        let values = left
            .column_scalars(position)
            .iter()
            .map(|a| compare_values(a, value, op, policy.strict))
            .collect::<Result<Vec<_>, _>>()?;
        columns.push((label, ColumnArray::Mixed(values)));
    }
    Ok(BlockCollection::from_columns(columns, left.row_axis().clone())?)
}

/// Elementwise boolean combination of two bool collections.
pub fn boolean(
    left: &BlockCollection,
    right: &BlockCollection,
    op: BooleanOp,
    policy: &OpPolicy,
) -> Result<BlockCollection, DispatchError> {
    let (left, right) = align_collections(left, right, policy)?;
    let mut columns = Vec::with_capacity(left.ncols());
    for position in 0..left.ncols() {
        for side in [&left, &right] {
            let kind = side.column_kind(position);
            if !matches!(kind, Kind::Bool | Kind::Object) {
                return Err(DispatchError::NotBoolean(kind));
            }
        }
        let label = left.col_axis().labels()[position].clone();
        let lhs = left.column_scalars(position);
        let rhs = right.column_scalars(position);
        let values = lhs
            .iter()
            .zip(rhs.iter())
            .map(|(a, b)| boolean_values(a, b, op))
            .collect::<Result<Vec<_>, _>>()?;
        columns.push((label, ColumnArray::Mixed(values)));
    }
    Ok(BlockCollection::from_columns(columns, left.row_axis().clone())?)
}

// ── column kernels ─────────────────────────────────────────────────────

fn arith_columns(
    lhs: &[Scalar],
    rhs: &[Scalar],
    left_kind: Kind,
    right_kind: Kind,
    op: ArithmeticOp,
    strict: bool,
) -> Result<ColumnArray, DispatchError> {
    let left_num = effective_numeric(left_kind);
    let right_num = effective_numeric(right_kind);

    if let (Some(lk), Some(rk)) = (left_num, right_num) {
        // Integer fast path keeps Int64 except for division, which always
        // produces Float64; i64 arithmetic wraps.
        if lk == Kind::Int64 && rk == Kind::Int64 && !matches!(op, ArithmeticOp::Div) {
            if let (Some(a), Some(b)) = (column_to_i64(lhs), column_to_i64(rhs)) {
                return Ok(ColumnArray::Int64(vectorized_binary_i64(&a, &b, op)));
            }
        }
        if let (Some(a), Some(b)) = (column_to_f64(lhs), column_to_f64(rhs)) {
            return Ok(ColumnArray::Float64(vectorized_binary_f64(&a, &b, op)));
        }
    }

    // String concatenation is the one non-numeric arithmetic case.
    if matches!(op, ArithmeticOp::Add) && is_stringy(lhs) && is_stringy(rhs) {
        let values = lhs
            .iter()
            .zip(rhs.iter())
            .map(|(a, b)| match (a, b) {
                (Scalar::Utf8(x), Scalar::Utf8(y)) => {
                    let mut joined = String::with_capacity(x.len() + y.len());
                    joined.push_str(x);
                    joined.push_str(y);
                    Scalar::Utf8(joined)
                }
                _ => Scalar::Null(NullKind::Null),
            })
            .collect();
        return Ok(ColumnArray::Mixed(values));
    }

    if strict {
        return Err(DispatchError::IncompatibleOperands {
            left: left_kind,
            right: right_kind,
        });
    }
    // Lenient fallback: degrade to an all-missing object column.
    Ok(ColumnArray::Mixed(vec![
        Scalar::Null(NullKind::Null);
        lhs.len()
    ]))
}

/// The numeric kind a column participates in arithmetic as, if any.
fn effective_numeric(kind: Kind) -> Option<Kind> {
    match kind {
        Kind::Int64 | Kind::Bool => Some(Kind::Int64),
        Kind::Float64 | Kind::Sparse => Some(Kind::Float64),
        _ => None,
    }
}

fn column_to_i64(values: &[Scalar]) -> Option<Vec<i64>> {
    values
        .iter()
        .map(|v| match v {
            Scalar::Int64(x) => Some(*x),
            Scalar::Bool(x) => Some(i64::from(*x)),
            _ => None,
        })
        .collect()
}

/// Missing entries become NaN so the float kernel propagates them for free.
fn column_to_f64(values: &[Scalar]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| match v {
            Scalar::Float64(x) => Some(*x),
            Scalar::Int64(x) => Some(*x as f64),
            Scalar::Bool(x) => Some(f64::from(u8::from(*x))),
            Scalar::Null(_) => Some(f64::NAN),
            _ => None,
        })
        .collect()
}

fn is_stringy(values: &[Scalar]) -> bool {
    values
        .iter()
        .all(|v| matches!(v, Scalar::Utf8(_)) || v.is_missing())
}

/// Zipped slice arithmetic over contiguous `f64` buffers.
fn vectorized_binary_f64(left: &[f64], right: &[f64], op: ArithmeticOp) -> Vec<f64> {
    let apply: fn(f64, f64) -> f64 = match op {
        ArithmeticOp::Add => |a, b| a + b,
        ArithmeticOp::Sub => |a, b| a - b,
        ArithmeticOp::Mul => |a, b| a * b,
        ArithmeticOp::Div => |a, b| a / b,
    };
    left.iter().zip(right).map(|(&a, &b)| apply(a, b)).collect()
}

fn vectorized_binary_i64(left: &[i64], right: &[i64], op: ArithmeticOp) -> Vec<i64> {
    let apply: fn(i64, i64) -> i64 = match op {
        ArithmeticOp::Add => i64::wrapping_add,
        ArithmeticOp::Sub => i64::wrapping_sub,
        ArithmeticOp::Mul => i64::wrapping_mul,
        ArithmeticOp::Div => unreachable!("division routes through the float kernel"),
    };
    left.iter().zip(right).map(|(&a, &b)| apply(a, b)).collect()
}

fn compare_values(
    left: &Scalar,
    right: &Scalar,
    op: ComparisonOp,
    strict: bool,
) -> Result<Scalar, DispatchError> {
    if left.is_missing() || right.is_missing() {
        return Ok(Scalar::Null(NullKind::Null));
    }

    let ordering_ok = |result: bool| Ok(Scalar::Bool(result));
    match (left, right) {
        (Scalar::Utf8(a), Scalar::Utf8(b)) => ordering_ok(apply_ordering(a.cmp(b), op)),
        (Scalar::Bool(a), Scalar::Bool(b)) => ordering_ok(apply_ordering(a.cmp(b), op)),
        (Scalar::DateTime(a), Scalar::DateTime(b))
        | (Scalar::TimeDelta(a), Scalar::TimeDelta(b)) => {
            ordering_ok(apply_ordering(a.cmp(b), op))
        }
        _ => match (left.to_f64(), right.to_f64()) {
            (Ok(a), Ok(b)) => ordering_ok(match op {
                ComparisonOp::Gt => a > b,
                ComparisonOp::Lt => a < b,
                ComparisonOp::Eq => a == b,
                ComparisonOp::Ne => a != b,
                ComparisonOp::Ge => a >= b,
                ComparisonOp::Le => a <= b,
            }),
            _ if strict => Err(DispatchError::IncompatibleOperands {
                left: left.kind().unwrap_or(Kind::Object),
                right: right.kind().unwrap_or(Kind::Object),
            }),
            // Values of unrelated kinds are unequal, not erroneous.
            _ => ordering_ok(matches!(op, ComparisonOp::Ne)),
        },
    }
}

fn apply_ordering(ordering: std::cmp::Ordering, op: ComparisonOp) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match op {
        ComparisonOp::Gt => ordering == Greater,
        ComparisonOp::Lt => ordering == Less,
        ComparisonOp::Eq => ordering == Equal,
        ComparisonOp::Ne => ordering != Equal,
        ComparisonOp::Ge => ordering != Less,
        ComparisonOp::Le => ordering != Greater,
    }
}

fn boolean_values(left: &Scalar, right: &Scalar, op: BooleanOp) -> Result<Scalar, DispatchError> {
    if left.is_missing() || right.is_missing() {
        return Ok(Scalar::Null(NullKind::Null));
    }
    match (left, right) {
        (Scalar::Bool(a), Scalar::Bool(b)) => Ok(Scalar::Bool(match op {
            BooleanOp::And => *a && *b,
            BooleanOp::Or => *a || *b,
            BooleanOp::Xor => a != b,
        })),
        _ => Err(DispatchError::NotBoolean(
            left.kind().or(right.kind()).unwrap_or(Kind::Object),
        )),
    }
}
