#![forbid(unsafe_code)]

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Label {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered sequence of axis labels with O(1)-amortized label lookup and
/// lazily cached uniqueness/monotonicity. Duplicate labels are permitted;
/// lookups then degrade to "all positions matching label".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisIndex {
    labels: Vec<Label>,
    #[serde(skip)]
    unique_cache: OnceCell<bool>,
    #[serde(skip)]
    monotonic_cache: OnceCell<bool>,
    #[serde(skip)]
    first_position_cache: OnceCell<HashMap<Label, usize>>,
}

impl PartialEq for AxisIndex {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for AxisIndex {}

fn detect_unique(labels: &[Label]) -> bool {
    let mut seen = HashMap::<&Label, ()>::with_capacity(labels.len());
    for label in labels {
        if seen.insert(label, ()).is_some() {
            return false;
        }
    }
    true
}

fn detect_monotonic(labels: &[Label]) -> bool {
    labels.windows(2).all(|w| w[0] <= w[1])
}

impl AxisIndex {
    #[must_use]
    pub fn new(labels: Vec<Label>) -> Self {
        Self {
            labels,
            unique_cache: OnceCell::new(),
            monotonic_cache: OnceCell::new(),
            first_position_cache: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(values.into_iter().map(Label::from).collect())
    }

    #[must_use]
    pub fn from_utf8(values: Vec<String>) -> Self {
        Self::new(values.into_iter().map(Label::from).collect())
    }

    #[must_use]
    pub fn from_range(start: i64, stop: i64) -> Self {
        Self::new((start..stop).map(Label::Int64).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        *self.unique_cache.get_or_init(|| detect_unique(&self.labels))
    }

    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        *self
            .monotonic_cache
            .get_or_init(|| detect_monotonic(&self.labels))
    }

    fn first_positions(&self) -> &HashMap<Label, usize> {
        self.first_position_cache.get_or_init(|| {
            let mut positions = HashMap::with_capacity(self.labels.len());
            for (idx, label) in self.labels.iter().enumerate() {
                positions.entry(label.clone()).or_insert(idx);
            }
            positions
        })
    }

    /// First position of `needle`, if present.
    #[must_use]
    pub fn position(&self, needle: &Label) -> Option<usize> {
        self.first_positions().get(needle).copied()
    }

    /// Every position holding `needle`, in axis order. Empty when absent.
    #[must_use]
    pub fn positions_of(&self, needle: &Label) -> Vec<usize> {
        if self.is_unique() {
            return self.position(needle).into_iter().collect();
        }
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(idx, label)| (label == needle).then_some(idx))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, label: &Label) -> bool {
        self.first_positions().contains_key(label)
    }

    /// For each target label, the first matching position here, or `None`
    /// for labels absent from this axis (the missing sentinel).
    #[must_use]
    pub fn get_indexer(&self, target: &Self) -> Vec<Option<usize>> {
        let map = self.first_positions();
        target
            .labels
            .iter()
            .map(|label| map.get(label).copied())
            .collect()
    }

    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.labels == other.labels
    }

    // ── set algebra ────────────────────────────────────────────────────

    #[must_use]
    pub fn union_with(&self, other: &Self) -> Self {
        // Both sides sorted and unique: a linear merge preserves
        // monotonicity and skips the hash pass.
        if self.is_monotonic() && other.is_monotonic() && self.is_unique() && other.is_unique() {
            return self.merge_monotonic(other);
        }

        let mut seen = HashMap::<&Label, ()>::new();
        let mut labels = Vec::with_capacity(self.labels.len() + other.labels.len());
        for label in self.labels.iter().chain(other.labels.iter()) {
            if seen.insert(label, ()).is_none() {
                labels.push(label.clone());
            }
        }
        Self::new(labels)
    }

    fn merge_monotonic(&self, other: &Self) -> Self {
        let (a, b) = (&self.labels, &other.labels);
        let mut labels = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    labels.push(a[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    labels.push(b[j].clone());
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    labels.push(a[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        labels.extend_from_slice(&a[i..]);
        labels.extend(b[j..].iter().cloned());
        Self::new(labels)
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let other_map = other.first_positions();
        let mut seen = HashMap::<&Label, ()>::new();
        let labels: Vec<Label> = self
            .labels
            .iter()
            .filter(|l| other_map.contains_key(*l) && seen.insert(l, ()).is_none())
            .cloned()
            .collect();
        Self::new(labels)
    }

    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let other_map = other.first_positions();
        let mut seen = HashMap::<&Label, ()>::new();
        let labels: Vec<Label> = self
            .labels
            .iter()
            .filter(|l| !other_map.contains_key(*l) && seen.insert(l, ()).is_none())
            .cloned()
            .collect();
        Self::new(labels)
    }

    // ── structural ─────────────────────────────────────────────────────

    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        Self::new(
            positions
                .iter()
                .map(|&i| self.labels[i].clone())
                .collect(),
        )
    }

    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let start = start.min(self.labels.len());
        let end = (start + len).min(self.labels.len());
        Self::new(self.labels[start..end].to_vec())
    }

    /// New axis with `label` inserted before `position`.
    #[must_use]
    pub fn insert(&self, position: usize, label: Label) -> Self {
        let position = position.min(self.labels.len());
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.extend_from_slice(&self.labels[..position]);
        labels.push(label);
        labels.extend_from_slice(&self.labels[position..]);
        Self::new(labels)
    }

    /// New axis with the given positions removed. Positions must be sorted
    /// ascending; out-of-range entries are ignored.
    #[must_use]
    pub fn delete(&self, positions: &[usize]) -> Self {
        let mut drop = vec![false; self.labels.len()];
        for &pos in positions {
            if pos < drop.len() {
                drop[pos] = true;
            }
        }
        Self::new(
            self.labels
                .iter()
                .zip(&drop)
                .filter_map(|(label, &gone)| (!gone).then(|| label.clone()))
                .collect(),
        )
    }
}

// ── joins ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinHow {
    Inner,
    Left,
    Right,
    Outer,
}

/// Joined axis plus per-side position vectors (`None` marks a label the
/// side does not carry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentPlan {
    pub joined: AxisIndex,
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("alignment vectors must have equal lengths")]
    InvalidAlignmentVectors,
}

pub fn join(left: &AxisIndex, right: &AxisIndex, how: JoinHow) -> AlignmentPlan {
    match how {
        JoinHow::Inner => join_inner(left, right),
        JoinHow::Left => join_left(left, right),
        JoinHow::Right => {
            let plan = join_left(right, left);
            AlignmentPlan {
                joined: plan.joined,
                left_positions: plan.right_positions,
                right_positions: plan.left_positions,
            }
        }
        JoinHow::Outer => join_outer(left, right),
    }
}

fn join_inner(left: &AxisIndex, right: &AxisIndex) -> AlignmentPlan {
    let right_map = right.first_positions();

    let mut joined = Vec::new();
    let mut left_positions = Vec::new();
    let mut right_positions = Vec::new();
    for (left_pos, label) in left.labels.iter().enumerate() {
        if let Some(&right_pos) = right_map.get(label) {
            joined.push(label.clone());
            left_positions.push(Some(left_pos));
            right_positions.push(Some(right_pos));
        }
    }

    AlignmentPlan {
        joined: AxisIndex::new(joined),
        left_positions,
        right_positions,
    }
}

fn join_left(left: &AxisIndex, right: &AxisIndex) -> AlignmentPlan {
    let right_map = right.first_positions();

    let mut left_positions = Vec::with_capacity(left.len());
    let mut right_positions = Vec::with_capacity(left.len());
    for (left_pos, label) in left.labels.iter().enumerate() {
        left_positions.push(Some(left_pos));
        right_positions.push(right_map.get(label).copied());
    }

    AlignmentPlan {
        joined: left.clone(),
        left_positions,
        right_positions,
    }
}

fn join_outer(left: &AxisIndex, right: &AxisIndex) -> AlignmentPlan {
    let joined = left.union_with(right);
    let left_map = left.first_positions();
    let right_map = right.first_positions();

    let left_positions = joined
        .labels
        .iter()
        .map(|label| left_map.get(label).copied())
        .collect();
    let right_positions = joined
        .labels
        .iter()
        .map(|label| right_map.get(label).copied())
        .collect();

    AlignmentPlan {
        joined,
        left_positions,
        right_positions,
    }
}

pub fn validate_alignment_plan(plan: &AlignmentPlan) -> Result<(), IndexError> {
    if plan.left_positions.len() != plan.right_positions.len()
        || plan.left_positions.len() != plan.joined.len()
    {
        return Err(IndexError::InvalidAlignmentVectors);
    }
    Ok(())
}
