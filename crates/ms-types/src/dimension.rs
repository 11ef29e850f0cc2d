//! Search dimensions: bounded index ranges mapped onto parameter values.

use serde::{Deserialize, Serialize};

/// How an index along a dimension maps to a real parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    /// value = index + 1 (e.g. instance count 1, 2, 3, ...)
    Linear,
    /// value = 2^index (e.g. batch size 1, 2, 4, 8, ...)
    Exponential,
}

/// A single tunable axis of the search grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDimension {
    pub name: String,
    pub kind: DimensionKind,
    pub min_index: i64,
    pub max_index: i64,
}

impl SearchDimension {
    pub fn new(
        name: impl Into<String>,
        kind: DimensionKind,
        min_index: i64,
        max_index: i64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            min_index,
            max_index,
        }
    }

    pub fn linear(name: impl Into<String>, min_index: i64, max_index: i64) -> Self {
        Self::new(name, DimensionKind::Linear, min_index, max_index)
    }

    pub fn exponential(name: impl Into<String>, min_index: i64, max_index: i64) -> Self {
        Self::new(name, DimensionKind::Exponential, min_index, max_index)
    }

    /// Parameter value at `index`.
    pub fn value_at(&self, index: i64) -> i64 {
        match self.kind {
            DimensionKind::Linear => index + 1,
            DimensionKind::Exponential => 1i64 << index.clamp(0, 62),
        }
    }

    /// Inverse of [`value_at`](Self::value_at). `None` when `value` has no
    /// exact index (e.g. 3 on an exponential axis).
    pub fn index_of(&self, value: i64) -> Option<i64> {
        match self.kind {
            DimensionKind::Linear => Some(value - 1),
            DimensionKind::Exponential => {
                if value > 0 && (value & (value - 1)) == 0 {
                    Some(i64::from(value.trailing_zeros()))
                } else {
                    None
                }
            }
        }
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= self.min_index && index <= self.max_index
    }

    pub fn clamp(&self, index: i64) -> i64 {
        index.min(self.max_index).max(self.min_index)
    }

    /// Number of grid points along this axis.
    pub fn len(&self) -> usize {
        (self.max_index - self.min_index + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
