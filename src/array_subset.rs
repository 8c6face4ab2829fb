//! Array subsets.
//!
//! An [`ArraySubset`] identifies a contiguous hyper-rectangular region of a
//! logical array. It is the "selection" handed to lazy sources when fetching a
//! window, and the address attached to every window yielded by a
//! [`BufferIterator`](crate::iterator::BufferIterator).
//!
//! This module provides convenience functions for:
//!  - iterating over the indices or windows of an array subset, and
//!  - extracting the elements within a subset of a flat array.

mod subset_iterators;

pub use subset_iterators::{
    ContiguousLinearisedIndices, ContiguousLinearisedIndicesIterator, Indices, IndicesIterator,
    ParIndicesIterator, ParWindowsIterator, Windows, WindowsIterator,
};

use derive_more::Display;
use itertools::izip;
use thiserror::Error;

use crate::array::{ArrayIndices, ArrayShape};

/// An array subset.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default)]
#[display("start {start:?} shape {shape:?}")]
pub struct ArraySubset {
    /// The start of the array subset.
    start: ArrayIndices,
    /// The shape of the array subset.
    shape: ArrayShape,
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {_0}, expected {_1}")]
pub struct IncompatibleDimensionalityError(pub(crate) usize, pub(crate) usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An incompatible array shape error.
#[derive(Clone, Debug, Error)]
#[error("incompatible array shape {_0:?} with array subset {_1}")]
pub struct IncompatibleArrayShapeError(ArrayShape, ArraySubset);

impl ArraySubset {
    /// Create a new array subset with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create a new array subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `shape` do not match.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    /// Create a new array subset from a start and end (exclusive).
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `end` do not match.
    pub fn new_with_start_end_exc(
        start: ArrayIndices,
        end: ArrayIndices,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == end.len() {
            let shape = std::iter::zip(&start, end)
                .map(|(&start, end)| end.saturating_sub(start))
                .collect();
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(start.len(), end.len()))
        }
    }

    /// Bound the array subset to the domain within `end` (exclusive).
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `end` does not match the array subset dimensionality.
    pub fn bound(&self, end: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if end.len() == self.dimensionality() {
            let start = std::iter::zip(self.start(), end)
                .map(|(&a, &b)| std::cmp::min(a, b))
                .collect();
            let end = std::iter::zip(self.end_exc(), end)
                .map(|(a, &b)| std::cmp::min(a, b))
                .collect();
            Self::new_with_start_end_exc(start, end)
        } else {
            Err(IncompatibleDimensionalityError::new(
                end.len(),
                self.dimensionality(),
            ))
        }
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the number of elements of the array subset.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the number of elements of the array subset as a `usize`.
    ///
    /// # Panics
    /// Panics if [`num_elements()`](Self::num_elements()) is greater than [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Returns true if the array subset is within the bounds of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        if self.dimensionality() != array_shape.len() {
            return false;
        }
        for (subset_start, subset_shape, shape) in izip!(self.start(), self.shape(), array_shape) {
            if subset_start + subset_shape > *shape {
                return false;
            }
        }
        true
    }

    /// Return the subset of this array subset relative to `subset_other`.
    ///
    /// The returned subset is in the coordinate space of `subset_other`,
    /// clipped to its extent.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the dimensionality of `subset_other` does not match this array subset.
    pub fn relative_to(
        &self,
        subset_other: &Self,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset_other.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                subset_other.dimensionality(),
                self.dimensionality(),
            ));
        }
        let mut starts = Vec::with_capacity(self.start.len());
        let mut shapes = Vec::with_capacity(self.start.len());
        for (start, size, other_start, other_size) in izip!(
            &self.start,
            &self.shape,
            subset_other.start(),
            subset_other.shape(),
        ) {
            let output_start = start.saturating_sub(*other_start);
            let output_end =
                std::cmp::min((start + size).saturating_sub(*other_start), *other_size);
            starts.push(output_start);
            shapes.push(output_end.saturating_sub(output_start));
        }
        Self::new_with_start_shape(starts, shapes)
    }

    /// Return [`ndarray`] slice info selecting this subset of an array.
    ///
    /// # Panics
    /// Panics if a start or end index exceeds [`isize::MAX`].
    #[must_use]
    pub fn to_slice_info(&self) -> Vec<ndarray::SliceInfoElem> {
        std::iter::zip(&self.start, self.end_exc())
            .map(|(&start, end)| ndarray::SliceInfoElem::Slice {
                start: isize::try_from(start).unwrap(),
                end: Some(isize::try_from(end).unwrap()),
                step: 1,
            })
            .collect()
    }

    /// Return the shape of the subset as `usize` components, for [`ndarray`] interop.
    ///
    /// # Panics
    /// Panics if any component exceeds [`usize::MAX`].
    #[must_use]
    pub fn shape_usize(&self) -> Vec<usize> {
        self.shape
            .iter()
            .map(|&size| usize::try_from(size).unwrap())
            .collect()
    }

    /// Return the elements in this array subset from a flat array with shape `array_shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleArrayShapeError`] if `elements` or `array_shape` are incompatible with this subset.
    pub fn extract_elements<T: Copy>(
        &self,
        elements: &[T],
        array_shape: &[u64],
    ) -> Result<Vec<T>, IncompatibleArrayShapeError> {
        if elements.len() as u64 != array_shape.iter().product::<u64>()
            || !self.inbounds(array_shape)
        {
            return Err(IncompatibleArrayShapeError(
                array_shape.to_vec(),
                self.clone(),
            ));
        }
        let mut subset_elements = Vec::with_capacity(self.num_elements_usize());
        for (index, contiguous_elements) in
            ContiguousLinearisedIndices::new(self, array_shape).iter()
        {
            let offset = usize::try_from(index).unwrap();
            let length = usize::try_from(contiguous_elements).unwrap();
            subset_elements.extend_from_slice(&elements[offset..offset + length]);
        }
        Ok(subset_elements)
    }

    /// Returns an iterator over the indices of elements within the subset.
    #[must_use]
    pub fn indices(&self) -> Indices {
        Indices::new(self.clone())
    }

    /// Returns an iterator over windows of shape `window_shape` tiling the subset.
    ///
    /// Windows are clipped to the bounds of the subset; trailing windows along
    /// any axis where the subset shape is not a multiple of `window_shape` are
    /// truncated, never padded.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `window_shape` does not match the subset dimensionality.
    pub fn windows(&self, window_shape: &[u64]) -> Result<Windows, IncompatibleDimensionalityError> {
        Windows::new(self, window_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset_geometry() {
        let subset = ArraySubset::new_with_start_shape(vec![2, 1], vec![2, 2]).unwrap();
        assert_eq!(subset.end_exc(), vec![4, 3]);
        assert_eq!(subset.num_elements(), 4);
        assert!(subset.inbounds(&[4, 3]));
        assert!(!subset.inbounds(&[4, 2]));
        assert!(ArraySubset::new_with_start_shape(vec![0], vec![1, 1]).is_err());
    }

    #[test]
    fn array_subset_bound() {
        let subset = ArraySubset::new_with_start_shape(vec![90, 0], vec![30, 50]).unwrap();
        let bounded = subset.bound(&[100, 50]).unwrap();
        assert_eq!(bounded.start(), &[90, 0]);
        assert_eq!(bounded.shape(), &[10, 50]);
        assert!(subset.bound(&[100]).is_err());
    }

    #[test]
    fn array_subset_relative_to() {
        let buffer = ArraySubset::new_with_start_shape(vec![30, 0], vec![30, 50]).unwrap();
        let chunk = ArraySubset::new_with_start_shape(vec![40, 10], vec![10, 10]).unwrap();
        let relative = chunk.relative_to(&buffer).unwrap();
        assert_eq!(relative.start(), &[10, 10]);
        assert_eq!(relative.shape(), &[10, 10]);
    }

    #[test]
    fn array_subset_extract_elements() {
        let elements: Vec<u32> = (0..12).collect();
        // 3x4 array, inner 2x2 starting at (1, 1)
        let subset = ArraySubset::new_with_start_shape(vec![1, 1], vec![2, 2]).unwrap();
        let extracted = subset.extract_elements(&elements, &[3, 4]).unwrap();
        assert_eq!(extracted, vec![5, 6, 9, 10]);
        assert!(subset.extract_elements(&elements, &[2, 4]).is_err());
    }
}
