//! Integer coordinates in the discrete search grid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Index, IndexMut, Sub};

/// A point in the search grid: one integer index per search dimension.
///
/// Arithmetic is value-semantic; `a + b` and `a - b` always return a new
/// coordinate so that coordinates used as map keys are never aliased.
/// Combining coordinates of different dimensionality is a programming
/// error and panics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(Vec<i64>);

impl Coordinate {
    pub fn new(values: Vec<i64>) -> Self {
        Self(values)
    }

    /// The origin of an `n`-dimensional grid.
    pub fn zeros(n: usize) -> Self {
        Self(vec![0; n])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, i64> {
        self.0.iter()
    }

    pub fn values(&self) -> &[i64] {
        &self.0
    }

    /// Copy of this coordinate with dimension `dim` set to `value`.
    pub fn with_value(&self, dim: usize, value: i64) -> Self {
        let mut values = self.0.clone();
        values[dim] = value;
        Self(values)
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        assert_eq!(self.len(), other.len(), "coordinate dimensionality mismatch");
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| ((a - b) as f64).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn zip_with(&self, other: &Coordinate, f: impl Fn(i64, i64) -> i64) -> Coordinate {
        assert_eq!(self.len(), other.len(), "coordinate dimensionality mismatch");
        Coordinate(self.0.iter().zip(&other.0).map(|(a, b)| f(*a, *b)).collect())
    }
}

impl From<Vec<i64>> for Coordinate {
    fn from(values: Vec<i64>) -> Self {
        Self(values)
    }
}

impl Index<usize> for Coordinate {
    type Output = i64;

    fn index(&self, index: usize) -> &i64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for Coordinate {
    fn index_mut(&mut self, index: usize) -> &mut i64 {
        &mut self.0[index]
    }
}

impl<'a> IntoIterator for &'a Coordinate {
    type Item = &'a i64;
    type IntoIter = std::slice::Iter<'a, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Add<&Coordinate> for &Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: &Coordinate) -> Coordinate {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Coordinate {
        &self + &rhs
    }
}

impl Sub<&Coordinate> for &Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: &Coordinate) -> Coordinate {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Coordinate {
        &self - &rhs
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}
