//! Array shapes, indices, and element types.
//!
//! The types in this module describe the *geometry* of the logical arrays this
//! crate streams: their shape, their chunking, and the numeric type of their
//! elements. The arrays themselves are never materialized in full; see
//! [`crate::iterator`] and [`crate::source`].

pub mod data_type;

pub use data_type::{DataType, Element, UnsupportedDataTypeError};

use std::num::NonZeroU64;

/// An ND index to an element in an array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// The shape of a chunk. All dimensions must be nonzero.
pub type ChunkShape = Vec<NonZeroU64>;

/// Convert a [`ChunkShape`] to an [`ArrayShape`].
#[must_use]
pub fn chunk_shape_to_array_shape(chunk_shape: &[NonZeroU64]) -> ArrayShape {
    chunk_shape.iter().map(|i| i.get()).collect()
}

/// Convert an [`ArrayShape`] to a [`ChunkShape`].
///
/// # Errors
/// Returns [`ZeroDimensionError`] if any dimension of `array_shape` is zero.
pub fn array_shape_to_chunk_shape(array_shape: &[u64]) -> Result<ChunkShape, ZeroDimensionError> {
    array_shape
        .iter()
        .enumerate()
        .map(|(axis, &size)| NonZeroU64::new(size).ok_or(ZeroDimensionError(axis)))
        .collect()
}

/// A zero dimension error. Holds the offending axis.
#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("dimension {_0} has zero size")]
pub struct ZeroDimensionError(pub usize);

/// Unravel a linearised index to ND indices.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices: ArrayIndices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *indices_i = index % dim;
        index /= dim;
    }
    indices
}

/// Ravel ND indices to a linearised index.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    let mut index: u64 = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        index += i * count;
        count *= s;
    }
    index
}
