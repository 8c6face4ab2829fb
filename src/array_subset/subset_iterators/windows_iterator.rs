use std::iter::FusedIterator;

use rayon::iter::{
    plumbing::{bridge, Consumer, Producer, ProducerCallback, UnindexedConsumer},
    IndexedParallelIterator, IntoParallelIterator, ParallelIterator,
};

use crate::{
    array::ArrayIndices,
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
};

use super::{indices_iterator::ParIndicesIteratorProducer, Indices, IndicesIterator, ParIndicesIterator};

/// Iterates over regular sized windows tiling an array subset.
///
/// Iterates over the last dimension fastest (i.e. C-contiguous order).
/// The iterator item is an ([`ArrayIndices`], [`ArraySubset`]) tuple holding
/// the window's position on the window grid and its extent.
///
/// Windows are clipped to the bounds of the subset: a trailing window along
/// any axis where the subset shape is not a multiple of the window shape is
/// truncated, never padded.
///
/// For example, tiling a subset of shape `(100, 50)` with windows of shape
/// `(30, 50)` produces four windows; the first three have shape `(30, 50)` and
/// the last has shape `(10, 50)`.
#[derive(Debug)]
pub struct Windows {
    grid: Indices,
    subset_start: ArrayIndices,
    subset_end: ArrayIndices,
    window_shape: Vec<u64>,
}

impl Windows {
    /// Create a new windows iterator.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `window_shape` does not match the dimensionality of `subset`.
    ///
    /// # Panics
    /// Panics if any component of `window_shape` is zero.
    pub fn new(
        subset: &ArraySubset,
        window_shape: &[u64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != window_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                window_shape.len(),
                subset.dimensionality(),
            ));
        }
        assert!(window_shape.iter().all(|&w| w > 0));
        let grid_shape: Vec<u64> = std::iter::zip(subset.shape(), window_shape)
            .map(|(&size, &window)| size.div_ceil(window))
            .collect();
        Ok(Self {
            grid: Indices::new(ArraySubset::new_with_shape(grid_shape)),
            subset_start: subset.start().to_vec(),
            subset_end: subset.end_exc(),
            window_shape: window_shape.to_vec(),
        })
    }

    /// Return the number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    /// Returns true if the number of windows is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a new serial iterator.
    #[must_use]
    pub fn iter(&self) -> WindowsIterator<'_> {
        <&Self as IntoIterator>::into_iter(self)
    }
}

impl<'a> IntoIterator for &'a Windows {
    type Item = (ArrayIndices, ArraySubset);
    type IntoIter = WindowsIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        WindowsIterator {
            inner: (&self.grid).into_iter(),
            parent: self,
        }
    }
}

impl<'a> IntoParallelIterator for &'a Windows {
    type Item = (ArrayIndices, ArraySubset);
    type Iter = ParWindowsIterator<'a>;

    fn into_par_iter(self) -> Self::Iter {
        ParWindowsIterator {
            inner: (&self.grid).into_par_iter(),
            parent: self,
        }
    }
}

impl Windows {
    fn grid_indices_to_window(&self, grid_indices: ArrayIndices) -> (ArrayIndices, ArraySubset) {
        let start: ArrayIndices = itertools::izip!(&grid_indices, &self.subset_start, &self.window_shape)
            .map(|(&g, &s, &w)| s + g * w)
            .collect();
        let end: ArrayIndices = itertools::izip!(&start, &self.window_shape, &self.subset_end)
            .map(|(&s, &w, &e)| std::cmp::min(s + w, e))
            .collect();
        let window = ArraySubset::new_with_start_end_exc(start, end)
            .expect("window constructed with subset dimensionality");
        (grid_indices, window)
    }
}

/// Serial windows iterator.
///
/// See [`Windows`].
pub struct WindowsIterator<'a> {
    inner: IndicesIterator<'a>,
    parent: &'a Windows,
}

impl Iterator for WindowsIterator<'_> {
    type Item = (ArrayIndices, ArraySubset);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|grid_indices| self.parent.grid_indices_to_window(grid_indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for WindowsIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner
            .next_back()
            .map(|grid_indices| self.parent.grid_indices_to_window(grid_indices))
    }
}

impl ExactSizeIterator for WindowsIterator<'_> {}

impl FusedIterator for WindowsIterator<'_> {}

/// Parallel windows iterator.
///
/// See [`Windows`].
pub struct ParWindowsIterator<'a> {
    inner: ParIndicesIterator<'a>,
    parent: &'a Windows,
}

impl ParallelIterator for ParWindowsIterator<'_> {
    type Item = (ArrayIndices, ArraySubset);

    fn drive_unindexed<C>(self, consumer: C) -> C::Result
    where
        C: UnindexedConsumer<Self::Item>,
    {
        bridge(self, consumer)
    }

    fn opt_len(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl IndexedParallelIterator for ParWindowsIterator<'_> {
    fn with_producer<CB: ProducerCallback<Self::Item>>(self, callback: CB) -> CB::Output {
        let producer = ParWindowsIteratorProducer::from(&self);
        callback.callback(producer)
    }

    fn drive<C: Consumer<Self::Item>>(self, consumer: C) -> C::Result {
        bridge(self, consumer)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[derive(Debug)]
struct ParWindowsIteratorProducer<'a> {
    inner: ParIndicesIteratorProducer<'a>,
    parent: &'a Windows,
}

impl<'a> Producer for ParWindowsIteratorProducer<'a> {
    type Item = (ArrayIndices, ArraySubset);
    type IntoIter = WindowsIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        WindowsIterator {
            inner: IndicesIterator::new_with_start_end(
                self.inner.subset,
                self.inner.index_front,
                self.inner.index_back,
            ),
            parent: self.parent,
        }
    }

    fn split_at(self, index: usize) -> (Self, Self) {
        let (left, right) = self.inner.split_at(index);
        (
            ParWindowsIteratorProducer {
                inner: left,
                parent: self.parent,
            },
            ParWindowsIteratorProducer {
                inner: right,
                parent: self.parent,
            },
        )
    }
}

impl<'a> From<&'a ParWindowsIterator<'_>> for ParWindowsIteratorProducer<'a> {
    fn from(iterator: &'a ParWindowsIterator<'_>) -> Self {
        Self {
            inner: ParIndicesIteratorProducer::from(&iterator.inner),
            parent: iterator.parent,
        }
    }
}
