//! Lazy imaging sources.
//!
//! An [`ImagingExtractor`] exposes an imaging stack sample-by-sample in its
//! native `(rows, columns)` convention. [`ImagingSource`] adapts it to a
//! [`LazySource`] in the container convention, which stores each sample as
//! `(columns, rows)`.

use ndarray::{ArrayD, Slice};

use crate::{
    array::{ArrayShape, Element},
    array_subset::ArraySubset,
};

use super::{LazySource, SourceError};

/// A lazy imaging stack.
///
/// Samples are indexed `0..num_samples` and share a fixed shape, natively
/// `(rows, columns)` or `(rows, columns, planes)`.
pub trait ImagingExtractor {
    /// The element type of the stack.
    type Elem: Element;

    /// Return the number of samples in the stack.
    fn num_samples(&self) -> u64;

    /// Return the native shape of one sample.
    fn sample_shape(&self) -> ArrayShape;

    /// Read samples `start..end` at their full native extent.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the range is out of bounds or the read fails.
    fn read_samples(&mut self, start: u64, end: u64)
        -> Result<ArrayD<Self::Elem>, SourceError>;
}

/// A [`LazySource`] over an [`ImagingExtractor`].
///
/// Applies the row/column transpose between the extractor's native
/// `(rows, columns)` sample convention and the container's `(columns, rows)`
/// convention. Omitting this transpose would silently corrupt the spatial
/// orientation of the output, so it is applied unconditionally to every
/// fetched window with 2-D or larger samples.
pub struct ImagingSource<E: ImagingExtractor> {
    extractor: E,
    full_shape: ArrayShape,
}

impl<E: ImagingExtractor> ImagingSource<E> {
    /// Create a new imaging source.
    ///
    /// The logical shape is `(num_samples, columns, rows, ...)`: the sample
    /// axes with the first two swapped relative to the extractor's native
    /// convention.
    #[must_use]
    pub fn new(extractor: E) -> Self {
        let sample_shape = extractor.sample_shape();
        let mut full_shape = Vec::with_capacity(1 + sample_shape.len());
        full_shape.push(extractor.num_samples());
        full_shape.extend_from_slice(&sample_shape);
        if sample_shape.len() >= 2 {
            full_shape.swap(1, 2);
        }
        Self {
            extractor,
            full_shape,
        }
    }

    /// Consume the source, returning the wrapped extractor.
    #[must_use]
    pub fn into_extractor(self) -> E {
        self.extractor
    }
}

impl<E: ImagingExtractor> LazySource for ImagingSource<E> {
    type Elem = E::Elem;

    fn full_shape(&self) -> ArrayShape {
        self.full_shape.clone()
    }

    fn fetch_window(&mut self, selection: &ArraySubset) -> Result<ArrayD<Self::Elem>, SourceError> {
        if selection.dimensionality() != self.full_shape.len()
            || !selection.inbounds(&self.full_shape)
        {
            return Err(SourceError::InvalidSelection(
                selection.clone(),
                self.full_shape.clone(),
            ));
        }

        let start = selection.start()[0];
        let end = start + selection.shape()[0];
        let mut samples = self.extractor.read_samples(start, end)?;
        if samples.ndim() >= 3 {
            samples.swap_axes(1, 2);
        }

        // Slice the requested sub-region of the (transposed) samples.
        let window = samples.slice_each_axis(|axis| {
            if axis.axis.index() == 0 {
                Slice::new(0, None, 1)
            } else {
                let axis_start = selection.start()[axis.axis.index()];
                let axis_end = axis_start + selection.shape()[axis.axis.index()];
                Slice::new(
                    isize::try_from(axis_start).unwrap(),
                    Some(isize::try_from(axis_end).unwrap()),
                    1,
                )
            }
        });
        Ok(window.to_owned())
    }
}
