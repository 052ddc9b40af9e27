use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Reference-counted storage window. A `SharedVec` either exclusively owns
/// its backing vector or is a view (shared owner and/or a sub-range window);
/// every mutating entry point goes through [`SharedVec::make_exclusive`],
/// so a view is never written through.
#[derive(Debug, Clone)]
pub struct SharedVec<T> {
    data: Arc<Vec<T>>,
    offset: usize,
    len: usize,
}

impl<T: Clone> SharedVec<T> {
    #[must_use]
    pub fn from_vec(values: Vec<T>) -> Self {
        let len = values.len();
        Self {
            data: Arc::new(values),
            offset: 0,
            len,
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
    pub fn as_slice(&self) -> &[T] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Non-copying sub-range view over the same backing storage.
    #[must_use]
    pub fn view(&self, start: usize, len: usize) -> Self {
        assert!(
            start + len <= self.len,
            "view {start}+{len} out of range for window of {}",
            self.len
        );
        Self {
            data: Arc::clone(&self.data),
            offset: self.offset + start,
            len,
        }
    }

    /// The checkable ownership property: sole owner of the full backing
    /// vector. Only then may storage be written in place.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.data) == 1 && self.offset == 0 && self.len == self.data.len()
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        !self.is_exclusive()
    }

    /// Copy-on-write: after this call the window exclusively owns its
    /// storage. A no-op when already exclusive.
    pub fn make_exclusive(&mut self) {
        if !self.is_exclusive() {
            let owned = self.as_slice().to_vec();
            self.len = owned.len();
            self.offset = 0;
            self.data = Arc::new(owned);
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.make_exclusive();
        Arc::get_mut(&mut self.data)
            .expect("storage is exclusive after make_exclusive")
            .as_mut_slice()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Gather into fresh exclusive storage; `None` slots take `fill`.
    #[must_use]
    pub fn gather(&self, indexer: &[Option<usize>], fill: &T) -> Self {
        let slice = self.as_slice();
        Self::from_vec(
            indexer
                .iter()
                .map(|slot| match slot {
                    Some(idx) => slice[*idx].clone(),
                    None => fill.clone(),
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn concat(parts: &[&Self]) -> Self {
        let total = parts.iter().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(total);
        for part in parts {
            out.extend_from_slice(part.as_slice());
        }
        Self::from_vec(out)
    }
}

impl<T: Clone + PartialEq> PartialEq for SharedVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Clone + Serialize> Serialize for SharedVec<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

impl<'de, T: Clone + Deserialize<'de>> Deserialize<'de> for SharedVec<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_vec(Vec::<T>::deserialize(deserializer)?))
    }
}
