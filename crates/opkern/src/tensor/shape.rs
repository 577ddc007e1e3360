//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Dimension storage kept inline for the common low-rank case.
type Dims = SmallVec<[i64; 8]>;

/// Stores the logical dimensions of a tensor.
///
/// A non-negative entry is a concrete extent. A negative entry stands for a
/// symbolic dimension whose extent is not yet known; two negative entries with
/// different values denote distinct symbols and never compare equal to any
/// concrete extent. The empty shape describes a scalar and has size one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    dims: Dims,
}

impl TensorShape {
    /// Constructs a shape from the provided dimensions.
    pub fn new(dims: impl IntoIterator<Item = i64>) -> Self {
        TensorShape {
            dims: dims.into_iter().collect(),
        }
    }

    /// Constructs the empty shape, i.e. a scalar.
    pub fn scalar() -> Self {
        TensorShape { dims: Dims::new() }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn num_dimensions(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    ///
    /// The empty shape yields one. Symbolic entries participate in the
    /// product as-is, so a shape holding one is not fully concrete unless
    /// every dimension is non-negative.
    pub fn size(&self) -> i64 {
        self.size_helper(0, self.dims.len())
    }

    /// Computes the product of dimensions strictly before `dimension`.
    ///
    /// Panics if `dimension` exceeds the rank.
    pub fn size_to_dimension(&self, dimension: usize) -> i64 {
        assert!(
            dimension <= self.dims.len(),
            "dimension {} out of range for shape of rank {}",
            dimension,
            self.dims.len()
        );
        self.size_helper(0, dimension)
    }

    /// Computes the product of dimensions from `dimension` to the end.
    ///
    /// Panics if `dimension` exceeds the rank.
    pub fn size_from_dimension(&self, dimension: usize) -> i64 {
        assert!(
            dimension <= self.dims.len(),
            "dimension {} out of range for shape of rank {}",
            dimension,
            self.dims.len()
        );
        self.size_helper(dimension, self.dims.len())
    }

    /// Returns the sub-shape covering `[start, end)`.
    ///
    /// Panics unless `start <= end <= rank`.
    pub fn slice(&self, start: usize, end: usize) -> TensorShape {
        assert!(
            start <= end && end <= self.dims.len(),
            "invalid slice [{start}, {end}) for shape of rank {}",
            self.dims.len()
        );
        TensorShape {
            dims: self.dims[start..end].into(),
        }
    }

    /// Returns the sub-shape from `start` to the last dimension.
    pub fn slice_from(&self, start: usize) -> TensorShape {
        self.slice(start, self.dims.len())
    }

    /// Reports whether the shape describes a single element.
    ///
    /// Both the empty shape and `[1]` qualify; higher-rank all-ones shapes do
    /// not.
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty() || (self.dims.len() == 1 && self.dims[0] == 1)
    }

    /// Reports whether every dimension carries a concrete extent.
    pub fn is_concrete(&self) -> bool {
        self.dims.iter().all(|d| *d >= 0)
    }

    fn size_helper(&self, start: usize, end: usize) -> i64 {
        self.dims[start..end].iter().product()
    }
}

impl Index<usize> for TensorShape {
    type Output = i64;

    fn index(&self, index: usize) -> &i64 {
        &self.dims[index]
    }
}

impl IndexMut<usize> for TensorShape {
    fn index_mut(&mut self, index: usize) -> &mut i64 {
        &mut self.dims[index]
    }
}

impl From<Vec<i64>> for TensorShape {
    fn from(dims: Vec<i64>) -> Self {
        TensorShape::new(dims)
    }
}

impl From<&[i64]> for TensorShape {
    fn from(dims: &[i64]) -> Self {
        TensorShape::new(dims.iter().copied())
    }
}

impl<const N: usize> From<[i64; N]> for TensorShape {
    fn from(dims: [i64; N]) -> Self {
        TensorShape::new(dims)
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_products_cover_the_whole_shape() {
        let shape = TensorShape::from([2, 3, 4]);
        assert_eq!(shape.size(), 24);
        assert_eq!(shape.size_to_dimension(0), 1);
        assert_eq!(shape.size_to_dimension(2), 6);
        assert_eq!(shape.size_to_dimension(3), shape.size());
        assert_eq!(shape.size_from_dimension(0), shape.size());
        assert_eq!(shape.size_from_dimension(1), 12);
        assert_eq!(shape.size_from_dimension(3), 1);
    }

    #[test]
    fn empty_shape_is_a_scalar_with_size_one() {
        let shape = TensorShape::scalar();
        assert_eq!(shape.size(), 1);
        assert_eq!(shape.num_dimensions(), 0);
        assert!(shape.is_scalar());
    }

    #[test]
    fn scalar_classification() {
        assert!(TensorShape::from([1]).is_scalar());
        assert!(!TensorShape::from([1, 1]).is_scalar());
        assert!(!TensorShape::from([2]).is_scalar());
    }

    #[test]
    fn slicing_returns_sub_shapes() {
        let shape = TensorShape::from([2, 3, 4, 5]);
        assert_eq!(shape.slice(1, 3), TensorShape::from([3, 4]));
        assert_eq!(shape.slice_from(2), TensorShape::from([4, 5]));
        assert_eq!(shape.slice(0, shape.num_dimensions()), shape);
        assert_eq!(shape.slice(2, 2), TensorShape::scalar());
    }

    #[test]
    #[should_panic(expected = "invalid slice")]
    fn slice_beyond_rank_panics() {
        TensorShape::from([2, 3]).slice(1, 5);
    }

    #[test]
    fn symbolic_dimensions_compare_elementwise() {
        let a = TensorShape::from([-1, 3]);
        let b = TensorShape::from([-1, 3]);
        let c = TensorShape::from([-2, 3]);
        let d = TensorShape::from([2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn display_uses_braced_dims() {
        assert_eq!(TensorShape::from([2, 1, 3]).to_string(), "{2,1,3}");
        assert_eq!(TensorShape::scalar().to_string(), "{}");
    }

    #[test]
    fn index_reads_and_writes_dimensions() {
        let mut shape = TensorShape::from([2, 3]);
        assert_eq!(shape[1], 3);
        shape[1] = 7;
        assert_eq!(shape.dims(), &[2, 7]);
    }
}
