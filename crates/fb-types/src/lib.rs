#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Missing-value sentinel for nanosecond-encoded datetime and timedelta
/// payloads ("not a time").
pub const NAT: i64 = i64::MIN;

/// Element kind of a storage buffer. Fixed for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Float64,
    Int64,
    Bool,
    Object,
    DateTime,
    DateTimeTz,
    TimeDelta,
    Categorical,
    Sparse,
}

impl Kind {
    /// Whether this kind can represent a missing entry natively.
    #[must_use]
    pub fn can_hold_na(self) -> bool {
        !matches!(self, Self::Int64 | Self::Bool)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Float64 | Self::Int64 | Self::Sparse)
    }

    #[must_use]
    pub fn is_datetimelike(self) -> bool {
        matches!(self, Self::DateTime | Self::DateTimeTz | Self::TimeDelta)
    }

    /// Kinds whose buffers may hold several columns and be merged with
    /// same-kind siblings. Timezone-aware, categorical and sparse buffers
    /// stay single-column.
    #[must_use]
    pub fn can_consolidate(self) -> bool {
        !matches!(self, Self::DateTimeTz | Self::Categorical | Self::Sparse)
    }

    /// The missing marker used when this kind has to synthesize an entry
    /// (reindex holes, masked take).
    #[must_use]
    pub fn fill_value(self) -> Scalar {
        match self {
            Self::Float64 | Self::Sparse => Scalar::Null(NullKind::NaN),
            Self::DateTime | Self::DateTimeTz | Self::TimeDelta => Scalar::Null(NullKind::NaT),
            Self::Int64 | Self::Bool | Self::Object | Self::Categorical => {
                Scalar::Null(NullKind::Null)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// UTC nanoseconds since the epoch. Calendar semantics live outside
    /// this layer; buffers only see the integer payload.
    DateTime(i64),
    /// Nanosecond duration.
    TimeDelta(i64),
}

impl Scalar {
    /// The kind this value would be stored as. Missing values carry no
    /// kind of their own.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Self::Null(_) => None,
            Self::Bool(_) => Some(Kind::Bool),
            Self::Int64(_) => Some(Kind::Int64),
            Self::Float64(_) => Some(Kind::Float64),
            Self::Utf8(_) => Some(Kind::Object),
            Self::DateTime(v) => {
                if *v == NAT {
                    None
                } else {
                    Some(Kind::DateTime)
                }
            }
            Self::TimeDelta(v) => {
                if *v == NAT {
                    None
                } else {
                    Some(Kind::TimeDelta)
                }
            }
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            Self::DateTime(v) | Self::TimeDelta(v) => *v == NAT,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaN)) || matches!(self, Self::Float64(v) if v.is_nan())
    }

    #[must_use]
    pub fn missing_for_kind(kind: Kind) -> Self {
        kind.fill_value()
    }

    /// Positional equality that treats same-class missing values as equal
    /// (NaN == NaN, NaT == NaT) without erasing the Null/NaN/NaT split.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            (Self::Null(NullKind::NaT), Self::DateTime(v))
            | (Self::DateTime(v), Self::Null(NullKind::NaT))
            | (Self::Null(NullKind::NaT), Self::TimeDelta(v))
            | (Self::TimeDelta(v), Self::Null(NullKind::NaT)) => *v == NAT,
            _ => self == other,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                kind: Kind::Object,
            }),
            Self::DateTime(_) => Err(TypeError::NonNumericValue {
                value: "datetime".to_owned(),
                kind: Kind::DateTime,
            }),
            Self::TimeDelta(_) => Err(TypeError::NonNumericValue {
                value: "timedelta".to_owned(),
                kind: Kind::TimeDelta,
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("kind coercion from {left:?} to {right:?} has no compatible common kind")]
    IncompatibleKinds { left: Kind, right: Kind },
    #[error("cannot cast scalar of kind {from:?} to {to:?}")]
    InvalidCast { from: Option<Kind>, to: Kind },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("expected 0/1 for bool cast but found {value}")]
    InvalidBoolValue { value: String },
    #[error("value {value:?} has non-numeric kind {kind:?}")]
    NonNumericValue { value: String, kind: Kind },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

/// Whether a lossless-only cast may instead degrade (truncate fractions,
/// collapse out-of-range values). `Strict` is the default for `astype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastPolicy {
    Strict,
    Lossy,
}

/// Widest-common-kind promotion. Total: `Object` is the top element, so
/// promotion never fails. Used by arithmetic materialization and row-wise
/// concatenation; strict casting goes through [`cast_scalar`] instead.
#[must_use]
pub fn promote(left: Kind, right: Kind) -> Kind {
    use Kind::{
        Bool, Categorical, DateTime, DateTimeTz, Float64, Int64, Object, Sparse, TimeDelta,
    };

    match (left, right) {
        (a, b) if a == b => {
            // Same-kind categorical buffers may still disagree on their
            // category sets; the buffer layer degrades those to Object.
            if a == Categorical { Object } else { a }
        }
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) | (Int64, Float64) | (Float64, Int64) => Float64,
        (Sparse, Float64 | Int64 | Bool) | (Float64 | Int64 | Bool, Sparse) => Float64,
        _ => Object,
    }
}

/// The kind a buffer must become to hold `value`. Returns the buffer's own
/// kind when [`can_hold`] already admits the value.
#[must_use]
pub fn promote_for_scalar(kind: Kind, value: &Scalar) -> Kind {
    if can_hold(kind, value) {
        return kind;
    }
    match value.kind() {
        // Missing value on a kind that cannot represent it: Int64 widens
        // to Float64 (NaN), Bool has no numeric missing marker and goes
        // to Object.
        None => match kind {
            Kind::Int64 => Kind::Float64,
            _ => Kind::Object,
        },
        Some(value_kind) => promote(kind, value_kind),
    }
}

/// Explicit "can this buffer kind store this value losslessly" query.
/// Value-aware: an integral `Float64` fits an `Int64` buffer.
#[must_use]
pub fn can_hold(kind: Kind, value: &Scalar) -> bool {
    match kind {
        Kind::Object => true,
        Kind::Float64 => matches!(
            value,
            Scalar::Null(_) | Scalar::Float64(_) | Scalar::Int64(_) | Scalar::Bool(_)
        ),
        Kind::Int64 => match value {
            Scalar::Int64(_) | Scalar::Bool(_) => true,
            Scalar::Float64(v) => v.is_finite() && *v == v.trunc() && in_i64_range(*v),
            _ => false,
        },
        Kind::Bool => matches!(value, Scalar::Bool(_)),
        Kind::DateTime | Kind::DateTimeTz => {
            matches!(value, Scalar::DateTime(_) | Scalar::Null(_))
        }
        Kind::TimeDelta => matches!(value, Scalar::TimeDelta(_) | Scalar::Null(_)),
        // Category membership is a buffer-level question; only missing
        // entries are admissible from kind information alone.
        Kind::Categorical => value.is_missing(),
        Kind::Sparse => matches!(
            value,
            Scalar::Null(_) | Scalar::Float64(_) | Scalar::Int64(_)
        ),
    }
}

fn in_i64_range(v: f64) -> bool {
    v >= i64::MIN as f64 && v <= i64::MAX as f64
}

/// Infer the narrowest kind able to hold every value. Missing entries do
/// not constrain the result; an all-missing or empty input infers
/// `Float64`, the original's default for untyped NA columns. Total,
/// because the promotion lattice tops out at `Object`.
#[must_use]
pub fn infer_kind(values: &[Scalar]) -> Kind {
    let mut current: Option<Kind> = None;
    for value in values {
        let Some(value_kind) = value.kind() else {
            continue;
        };
        current = Some(match current {
            None => value_kind,
            Some(kind) => promote(kind, value_kind),
        });
    }
    current.unwrap_or(Kind::Float64)
}

/// Cast a scalar to a target kind, taking ownership to skip clones when the
/// value already matches.
pub fn cast_scalar_owned(
    value: Scalar,
    target: Kind,
    policy: CastPolicy,
) -> Result<Scalar, TypeError> {
    // Boxing is identity: an object buffer holds any scalar as-is, so even
    // missing values keep their concrete form (NaN stays NaN).
    if target == Kind::Object {
        return Ok(value);
    }

    let from = value.kind();
    if value.is_missing() {
        if !target.can_hold_na() {
            return Err(TypeError::InvalidCast { from: None, to: target });
        }
        return Ok(Scalar::missing_for_kind(target));
    }
    if from == Some(target) {
        return Ok(value);
    }

    match target {
        Kind::Object => Ok(value),
        Kind::Bool => match &value {
            Scalar::Int64(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolValue {
                    value: v.to_string(),
                }),
            },
            Scalar::Float64(v) => {
                if *v == 0.0 {
                    Ok(Scalar::Bool(false))
                } else if *v == 1.0 {
                    Ok(Scalar::Bool(true))
                } else {
                    Err(TypeError::InvalidBoolValue {
                        value: v.to_string(),
                    })
                }
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::Int64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(*v))),
            Scalar::Float64(v) => {
                if v.is_finite() && *v == v.trunc() && in_i64_range(*v) {
                    Ok(Scalar::Int64(*v as i64))
                } else if matches!(policy, CastPolicy::Lossy) && v.is_finite() && in_i64_range(*v) {
                    Ok(Scalar::Int64(v.trunc() as i64))
                } else {
                    Err(TypeError::LossyFloatToInt { value: *v })
                }
            }
            // Nanosecond payloads unbox to their integer representation.
            Scalar::DateTime(v) | Scalar::TimeDelta(v) => Ok(Scalar::Int64(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::Float64 | Kind::Sparse => match &value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if *v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(*v as f64)),
            Scalar::Float64(v) => Ok(Scalar::Float64(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::DateTime | Kind::DateTimeTz => match &value {
            Scalar::Int64(v) => Ok(Scalar::DateTime(*v)),
            Scalar::DateTime(v) => Ok(Scalar::DateTime(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::TimeDelta => match &value {
            Scalar::Int64(v) => Ok(Scalar::TimeDelta(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::Categorical => Err(TypeError::InvalidCast { from, to: target }),
    }
}

/// Cast a scalar reference to a target kind (clones only when needed).
pub fn cast_scalar(value: &Scalar, target: Kind, policy: CastPolicy) -> Result<Scalar, TypeError> {
    cast_scalar_owned(value.clone(), target, policy)
}
