use std::iter::FusedIterator;

use itertools::izip;

use crate::{array::ravel_indices, array_subset::ArraySubset};

use super::{Indices, IndicesIterator};

/// Iterates over contiguous runs of linearised element indices in an array subset.
///
/// The iterator item is a tuple: (linearised index of the run start, number of contiguous elements).
///
/// A run spans every trailing axis where the subset covers the enclosing array
/// completely, so a subset of whole rows of a 2D array yields one run per row
/// group rather than one index per element.
pub struct ContiguousLinearisedIndices {
    inner: Indices,
    array_shape: Vec<u64>,
    contiguous_elements: u64,
}

impl ContiguousLinearisedIndices {
    /// Create a new contiguous linearised indices struct.
    ///
    /// # Panics
    /// Panics if `array_shape` does not encapsulate `subset`.
    #[must_use]
    pub fn new(subset: &ArraySubset, array_shape: &[u64]) -> Self {
        assert!(subset.inbounds(array_shape));
        let mut contiguous = true;
        let mut contiguous_elements = 1;
        let mut run_starts_shape = vec![0; array_shape.len()];
        for (&subset_start, &subset_size, &array_size, run_starts_shape_i) in izip!(
            subset.start().iter().rev(),
            subset.shape().iter().rev(),
            array_shape.iter().rev(),
            run_starts_shape.iter_mut().rev(),
        ) {
            if contiguous {
                contiguous_elements *= subset_size;
                *run_starts_shape_i = 1;
                contiguous = subset_start == 0 && subset_size == array_size;
            } else {
                *run_starts_shape_i = subset_size;
            }
        }
        let run_starts = ArraySubset::new_with_start_shape(subset.start().to_vec(), run_starts_shape)
            .expect("shapes constructed with matching dimensionality");
        Self {
            inner: run_starts.indices(),
            array_shape: array_shape.to_vec(),
            contiguous_elements,
        }
    }

    /// Return the number of contiguous elements (fixed on each iteration).
    #[must_use]
    pub fn contiguous_elements(&self) -> u64 {
        self.contiguous_elements
    }

    /// Return the number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Create a new serial iterator.
    #[must_use]
    pub fn iter(&self) -> ContiguousLinearisedIndicesIterator<'_> {
        <&Self as IntoIterator>::into_iter(self)
    }
}

impl<'a> IntoIterator for &'a ContiguousLinearisedIndices {
    type Item = (u64, u64);
    type IntoIter = ContiguousLinearisedIndicesIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        ContiguousLinearisedIndicesIterator {
            inner: self.inner.iter(),
            array_shape: &self.array_shape,
            contiguous_elements: self.contiguous_elements,
        }
    }
}

/// Serial contiguous linearised indices iterator.
///
/// See [`ContiguousLinearisedIndices`].
pub struct ContiguousLinearisedIndicesIterator<'a> {
    inner: IndicesIterator<'a>,
    array_shape: &'a [u64],
    contiguous_elements: u64,
}

impl Iterator for ContiguousLinearisedIndicesIterator<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|indices| (ravel_indices(&indices, self.array_shape), self.contiguous_elements))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ContiguousLinearisedIndicesIterator<'_> {}

impl FusedIterator for ContiguousLinearisedIndicesIterator<'_> {}
