//! Chunk and buffer shape estimation.
//!
//! Pure functions that fit rectangular sub-array shapes to byte budgets:
//!  - [`estimate_chunk_shape`] targets the on-disk chunk granularity (default budget ≈10 MB),
//!  - [`estimate_buffer_shape`] targets the in-memory window pulled from a lazy
//!    source per iteration (default budget ≈1 GB), always a per-axis superset of
//!    the chunk shape.
//!
//! Both uphold, for every axis `i` of an array of shape `full_shape`:
//! `1 <= chunk_shape[i] <= buffer_shape[i] <= full_shape[i]`.

use std::num::NonZeroU64;

use thiserror::Error;

use crate::array::{
    array_shape_to_chunk_shape, chunk_shape_to_array_shape, ArrayShape, ChunkShape, DataType,
    ZeroDimensionError,
};
use crate::array_subset::IncompatibleDimensionalityError;

/// An invalid or contradictory sizing/configuration parameter error.
///
/// Always raised before any I/O occurs; a configuration is never partially
/// applied.
#[derive(Clone, Debug, Error)]
pub enum ConfigurationError {
    /// A byte budget that must be positive was not.
    #[error("byte budget {_0} must be positive, got {_1}")]
    NonPositiveBudget(&'static str, f64),
    /// An array shape with no dimensions.
    #[error("array shape must have at least one dimension")]
    EmptyShape,
    /// An array shape with a zero dimension.
    #[error(transparent)]
    ZeroDimension(#[from] ZeroDimensionError),
    /// The buffer budget cannot hold a single chunk.
    #[error("buffer budget of {buffer_gb} GB cannot hold a single chunk of {chunk_bytes} bytes")]
    BufferBelowChunkSize {
        /// The buffer budget in gigabytes.
        buffer_gb: f64,
        /// The size of one chunk in bytes.
        chunk_bytes: u64,
    },
    /// Mismatched dimensionality between shapes.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// A chunk dimension exceeding the array dimension.
    #[error("chunk shape {chunk} exceeds array shape {full} on axis {axis}")]
    ChunkExceedsArray {
        /// The axis.
        axis: usize,
        /// The chunk size along the axis.
        chunk: u64,
        /// The array size along the axis.
        full: u64,
    },
    /// A chunk dimension exceeding the buffer dimension.
    #[error("chunk shape {chunk} exceeds buffer shape {buffer} on axis {axis}")]
    ChunkExceedsBuffer {
        /// The axis.
        axis: usize,
        /// The chunk size along the axis.
        chunk: u64,
        /// The buffer size along the axis.
        buffer: u64,
    },
    /// A buffer dimension exceeding the array dimension.
    #[error("buffer shape {buffer} exceeds array shape {full} on axis {axis}")]
    BufferExceedsArray {
        /// The axis.
        axis: usize,
        /// The buffer size along the axis.
        buffer: u64,
        /// The array size along the axis.
        full: u64,
    },
    /// Both an explicit shape and a byte budget were supplied for the same parameter.
    #[error("explicit {_0} shape and {_0} byte budget are mutually exclusive")]
    ConflictingShapeArguments(&'static str),
    /// A compression method outside the backend's supported set.
    #[error("compression method {name:?} is not supported by the {backend} backend")]
    UnsupportedCompression {
        /// The backend name.
        backend: &'static str,
        /// The requested compression method name.
        name: String,
    },
    /// A filter method outside the backend's supported set.
    #[error("filter method {name:?} is not supported by the {backend} backend")]
    UnsupportedFilter {
        /// The backend name.
        backend: &'static str,
        /// The requested filter method name.
        name: String,
    },
    /// Concurrent chunk writes requested on a backend without parallel write support.
    #[error("the {_0} backend does not support concurrent chunk writes")]
    ParallelWritesUnsupported(&'static str),
    /// A configured dataset location not present in the container.
    #[error("dataset location {_0:?} does not exist in the container")]
    UnknownDatasetLocation(String),
    /// A dataset compression configuration targeting a different backend.
    #[error("dataset {location:?} compression targets the {got} backend, expected {expected}")]
    BackendMismatch {
        /// The dataset location.
        location: String,
        /// The backend the compression configuration targets.
        got: &'static str,
        /// The backend of the enclosing configuration.
        expected: &'static str,
    },
    /// A dataset configuration disagreeing with the container about shape or data type.
    #[error("dataset {_0:?} configuration does not match the container dataset")]
    DatasetMismatch(String),
    /// A dataset already wrapped with a different storage configuration.
    #[error("dataset {_0:?} is already wrapped with a different storage configuration")]
    WrapConflict(String),
    /// A dataset already written to storage cannot be re-chunked.
    #[error("dataset {_0:?} is already written and cannot be re-chunked")]
    AlreadyWritten(String),
}

fn validate_shape(full_shape: &[u64]) -> Result<(), ConfigurationError> {
    if full_shape.is_empty() {
        return Err(ConfigurationError::EmptyShape);
    }
    for (axis, &size) in full_shape.iter().enumerate() {
        if size == 0 {
            return Err(ZeroDimensionError(axis).into());
        }
    }
    Ok(())
}

/// Estimate a chunk shape for an array of `full_shape` targeting `chunk_mb` megabytes per chunk.
///
/// The estimate preserves the relative proportions of the array axes: the
/// shape is reduced to its smallest-axis ratios, shrunk until the ratio
/// quantum fits the budget, then scaled by the common factor
/// `floor((target_bytes / quantum_bytes)^(1/rank))` and clipped per axis to
/// `[1, full_shape[axis]]`. If the whole array fits the budget the array shape
/// is returned unchanged.
///
/// # Errors
/// Returns a [`ConfigurationError`] if `chunk_mb` is not positive or
/// `full_shape` is empty or has a zero dimension.
pub fn estimate_chunk_shape(
    full_shape: &[u64],
    data_type: DataType,
    chunk_mb: f64,
) -> Result<ChunkShape, ConfigurationError> {
    if chunk_mb <= 0.0 {
        return Err(ConfigurationError::NonPositiveBudget("chunk_mb", chunk_mb));
    }
    validate_shape(full_shape)?;

    let item_size = data_type.size() as u64;
    let target_bytes = chunk_mb * 1e6;

    let full_elements: u64 = full_shape.iter().product();
    if (full_elements * item_size) as f64 <= target_bytes {
        return Ok(array_shape_to_chunk_shape(full_shape).expect("validated nonzero"));
    }

    // Reduce the shape to its axis ratios and shrink the ratio quantum until
    // it fits the budget.
    let min_axis = *full_shape.iter().min().expect("validated non-empty");
    let mut ratios: Vec<u64> = full_shape.iter().map(|&size| size / min_axis).collect();
    let mut ratio_elements: u64 = ratios.iter().product();
    while (ratio_elements * item_size) as f64 > target_bytes && ratio_elements != 1 {
        let non_unit_min = ratios
            .iter()
            .copied()
            .filter(|&r| r > 1)
            .min()
            .expect("ratio_elements != 1 implies a non-unit ratio");
        for ratio in &mut ratios {
            if *ratio > 1 {
                *ratio /= non_unit_min;
            }
        }
        ratio_elements = ratios.iter().product();
    }

    let rank = full_shape.len();
    let scale = (target_bytes / (ratio_elements * item_size) as f64)
        .powf(1.0 / rank as f64)
        .floor() as u64;

    let chunk_shape: ArrayShape = std::iter::zip(&ratios, full_shape)
        .map(|(&ratio, &size)| (scale * ratio).clamp(1, size))
        .collect();
    Ok(array_shape_to_chunk_shape(&chunk_shape).expect("clamped to >= 1"))
}

/// Estimate a buffer shape for an array of `full_shape` targeting `buffer_gb` gigabytes per buffer.
///
/// The buffer shape is a per-axis superset of `chunk_shape` and, away from the
/// array boundary, a per-axis multiple of it. The policy tries, in order:
///  1. if the whole array fits the budget, the array shape is returned;
///  2. if even one whole axis of chunks exceeds the budget, a square of chunks
///     is formed over the smallest chunk axes;
///  3. otherwise a `(budget / chunk_bytes)^(1/rank)` scaled estimate is
///     compared against a greedy whole-axis fill (axes filled in ascending
///     order of chunk count, ties broken by ascending axis index) and the
///     shape using more of the budget without exceeding it is returned.
///
/// # Errors
/// Returns a [`ConfigurationError`] if `buffer_gb` is not positive, the budget
/// cannot hold one chunk, or the shapes are incompatible.
pub fn estimate_buffer_shape(
    buffer_gb: f64,
    chunk_shape: &[NonZeroU64],
    full_shape: &[u64],
    data_type: DataType,
) -> Result<ArrayShape, ConfigurationError> {
    if buffer_gb <= 0.0 {
        return Err(ConfigurationError::NonPositiveBudget("buffer_gb", buffer_gb));
    }
    validate_shape(full_shape)?;
    if chunk_shape.len() != full_shape.len() {
        return Err(
            IncompatibleDimensionalityError::new(chunk_shape.len(), full_shape.len()).into(),
        );
    }
    let chunk_shape = chunk_shape_to_array_shape(chunk_shape);
    for (axis, (&chunk, &full)) in std::iter::zip(&chunk_shape, full_shape).enumerate() {
        if chunk > full {
            return Err(ConfigurationError::ChunkExceedsArray { axis, chunk, full });
        }
    }

    let item_size = data_type.size() as u64;
    let target_bytes = buffer_gb * 1e9;
    let chunk_bytes: u64 = chunk_shape.iter().product::<u64>() * item_size;
    if chunk_bytes as f64 > target_bytes {
        return Err(ConfigurationError::BufferBelowChunkSize {
            buffer_gb,
            chunk_bytes,
        });
    }

    // The whole array fits within the budget.
    let full_bytes = full_shape.iter().product::<u64>() * item_size;
    if full_bytes as f64 <= target_bytes {
        return Ok(full_shape.to_vec());
    }

    let rank = full_shape.len();
    let chunks_per_axis: Vec<u64> = std::iter::zip(full_shape, &chunk_shape)
        .map(|(&full, &chunk)| full.div_ceil(chunk))
        .collect();

    // Even the cheapest whole axis of chunks exceeds the budget: form a square
    // of chunks over the smallest chunk axes (a line for rank 1 arrays).
    let min_axis_chunks = *chunks_per_axis.iter().min().expect("validated non-empty");
    if min_axis_chunks as f64 * chunk_bytes as f64 > target_bytes {
        let fill_axes = smallest_axes(&chunk_shape, rank.min(2));
        let scale = (target_bytes / chunk_bytes as f64)
            .powf(1.0 / fill_axes.len() as f64)
            .floor() as u64;
        let mut buffer_shape = chunk_shape.clone();
        for axis in fill_axes {
            buffer_shape[axis] =
                (scale.max(1) * chunk_shape[axis]).clamp(chunk_shape[axis], full_shape[axis]);
        }
        return Ok(buffer_shape);
    }

    // Scaled estimate: a common per-axis multiple of the chunk shape.
    let scale = (target_bytes / chunk_bytes as f64)
        .powf(1.0 / rank as f64)
        .floor() as u64;
    let unpadded: ArrayShape = std::iter::zip(&chunk_shape, full_shape)
        .map(|(&chunk, &full)| (scale.max(1) * chunk).clamp(chunk, full))
        .collect();
    let unpadded_bytes = unpadded.iter().product::<u64>() * item_size;

    // Greedy whole-axis fill, cheapest axis (fewest chunks) first.
    let mut fill_order: Vec<usize> = (0..rank).collect();
    fill_order.sort_by_key(|&axis| (chunks_per_axis[axis], axis));
    let mut padded = chunk_shape.clone();
    let mut padded_bytes = chunk_bytes;
    for axis in fill_order {
        if padded_bytes as f64 * chunks_per_axis[axis] as f64 <= target_bytes {
            padded_bytes *= chunks_per_axis[axis];
            padded[axis] = full_shape[axis];
        } else {
            let remaining = (target_bytes / padded_bytes as f64).floor() as u64;
            padded[axis] = (remaining.max(1) * chunk_shape[axis])
                .clamp(chunk_shape[axis], full_shape[axis]);
            break;
        }
    }
    let padded_bytes = padded.iter().product::<u64>() * item_size;

    if padded_bytes >= unpadded_bytes {
        Ok(padded)
    } else {
        Ok(unpadded)
    }
}

/// Return the indices of the `count` smallest components of `shape`, ties
/// broken by ascending axis index.
fn smallest_axes(shape: &[u64], count: usize) -> Vec<usize> {
    let mut axes: Vec<usize> = (0..shape.len()).collect();
    axes.sort_by_key(|&axis| (shape[axis], axis));
    axes.truncate(count);
    axes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_bytes(chunk_shape: &[NonZeroU64], data_type: DataType) -> u64 {
        chunk_shape.iter().map(|c| c.get()).product::<u64>() * data_type.size() as u64
    }

    #[test]
    fn chunk_shape_small_array_passes_through() {
        // 1000 * 4 * 2 bytes = 8 kB, well under 10 MB.
        let chunk_shape = estimate_chunk_shape(&[1000, 4], DataType::Int16, 10.0).unwrap();
        assert_eq!(chunk_shape_to_array_shape(&chunk_shape), vec![1000, 4]);
    }

    #[test]
    fn chunk_shape_respects_budget() {
        let full_shape = vec![1_000_000, 384];
        let chunk_shape = estimate_chunk_shape(&full_shape, DataType::Int16, 10.0).unwrap();
        for (chunk, full) in std::iter::zip(&chunk_shape, &full_shape) {
            assert!(chunk.get() >= 1);
            assert!(chunk.get() <= *full);
        }
        assert!(chunk_bytes(&chunk_shape, DataType::Int16) <= 10_000_000);
    }

    #[test]
    fn chunk_shape_various_shapes_fit_budget() {
        for full_shape in [
            vec![123_456_789],
            vec![1_000_000, 64],
            vec![10_000, 512, 512],
            vec![7, 1_000_000],
            vec![2, 2, 2, 100_000_000],
        ] {
            for chunk_mb in [0.1, 1.0, 10.0] {
                let chunk_shape =
                    estimate_chunk_shape(&full_shape, DataType::Float64, chunk_mb).unwrap();
                let bytes = chunk_bytes(&chunk_shape, DataType::Float64);
                let budget = (chunk_mb * 1e6) as u64;
                // Fits the budget unless reduced all the way to a single element.
                assert!(bytes <= budget || chunk_shape.iter().all(|c| c.get() == 1));
                for (chunk, full) in std::iter::zip(&chunk_shape, &full_shape) {
                    assert!(chunk.get() >= 1 && chunk.get() <= *full);
                }
            }
        }
    }

    #[test]
    fn chunk_shape_invalid_arguments() {
        assert!(estimate_chunk_shape(&[100], DataType::Int16, 0.0).is_err());
        assert!(estimate_chunk_shape(&[100], DataType::Int16, -1.0).is_err());
        assert!(estimate_chunk_shape(&[], DataType::Int16, 10.0).is_err());
        assert!(estimate_chunk_shape(&[100, 0], DataType::Int16, 10.0).is_err());
    }

    #[test]
    fn buffer_shape_small_array_passes_through() {
        let chunk_shape = array_shape_to_chunk_shape(&[1000, 4]).unwrap();
        let buffer_shape =
            estimate_buffer_shape(1.0, &chunk_shape, &[1000, 4], DataType::Int16).unwrap();
        assert_eq!(buffer_shape, vec![1000, 4]);
    }

    #[test]
    fn buffer_shape_bounds() {
        let full_shape = vec![10_000_000, 384];
        let chunk_shape =
            estimate_chunk_shape(&full_shape, DataType::Int16, 10.0).unwrap();
        let buffer_shape =
            estimate_buffer_shape(1.0, &chunk_shape, &full_shape, DataType::Int16).unwrap();
        for ((chunk, buffer), full) in
            std::iter::zip(std::iter::zip(&chunk_shape, &buffer_shape), &full_shape)
        {
            assert!(chunk.get() <= *buffer);
            assert!(*buffer <= *full);
        }
        let buffer_bytes = buffer_shape.iter().product::<u64>() * 2;
        assert!(buffer_bytes <= 1_000_000_000);
    }

    #[test]
    fn buffer_shape_multiple_of_chunk_away_from_boundary() {
        let full_shape = vec![10_000_000, 384];
        let chunk_shape = array_shape_to_chunk_shape(&[100_000, 64]).unwrap();
        let buffer_shape =
            estimate_buffer_shape(1.0, &chunk_shape, &full_shape, DataType::Int16).unwrap();
        for ((chunk, buffer), full) in
            std::iter::zip(std::iter::zip(&chunk_shape, &buffer_shape), &full_shape)
        {
            // A buffer axis is either the full axis (boundary truncation
            // applies downstream) or a whole multiple of the chunk axis.
            assert!(*buffer == *full || buffer % chunk.get() == 0);
        }
    }

    #[test]
    fn buffer_shape_too_small_for_chunk() {
        let chunk_shape = array_shape_to_chunk_shape(&[100_000, 64]).unwrap();
        // One chunk is 100_000 * 64 * 2 B = 12.8 MB > 0.001 GB.
        let result = estimate_buffer_shape(0.001, &chunk_shape, &[1_000_000, 64], DataType::Int16);
        assert!(matches!(
            result,
            Err(ConfigurationError::BufferBelowChunkSize { .. })
        ));
    }

    #[test]
    fn buffer_shape_square_fill() {
        // Even one whole axis of chunks exceeds the budget: a square of
        // chunks is formed over the two smallest chunk axes.
        let full_shape = vec![1_000_000, 1_000_000];
        let chunk_shape = array_shape_to_chunk_shape(&[1000, 1000]).unwrap();
        let buffer_shape =
            estimate_buffer_shape(1.0, &chunk_shape, &full_shape, DataType::Float64).unwrap();
        // floor(sqrt(1e9 / 8e6)) = 11 chunks per side.
        assert_eq!(buffer_shape, vec![11_000, 11_000]);
    }

    #[test]
    fn buffer_shape_partial_axis_fill() {
        // The short axis fills completely; the long axis takes as many whole
        // chunks as the remaining budget allows.
        let full_shape = vec![100_000_000_000, 2];
        let chunk_shape = array_shape_to_chunk_shape(&[1_000_000, 2]).unwrap();
        let buffer_shape =
            estimate_buffer_shape(1.0, &chunk_shape, &full_shape, DataType::Float64).unwrap();
        let buffer_bytes = buffer_shape.iter().product::<u64>() * 8;
        assert!(buffer_bytes <= 1_000_000_000);
        assert!(buffer_shape[0] >= 1_000_000 && buffer_shape[1] == 2);
    }

    #[test]
    fn buffer_shape_rank_one() {
        let full_shape = vec![10_000_000_000];
        let chunk_shape = array_shape_to_chunk_shape(&[1_000_000]).unwrap();
        let buffer_shape =
            estimate_buffer_shape(1.0, &chunk_shape, &full_shape, DataType::Float64).unwrap();
        assert_eq!(buffer_shape.len(), 1);
        assert!(buffer_shape[0] % 1_000_000 == 0);
        assert!(buffer_shape[0] * 8 <= 1_000_000_000);
    }

    #[test]
    fn buffer_shape_invalid_arguments() {
        let chunk_shape = array_shape_to_chunk_shape(&[10]).unwrap();
        assert!(estimate_buffer_shape(0.0, &chunk_shape, &[100], DataType::Int16).is_err());
        assert!(estimate_buffer_shape(1.0, &chunk_shape, &[100, 100], DataType::Int16).is_err());
        // Chunk exceeding the array shape.
        let chunk_shape = array_shape_to_chunk_shape(&[200]).unwrap();
        assert!(matches!(
            estimate_buffer_shape(1.0, &chunk_shape, &[100], DataType::Int16),
            Err(ConfigurationError::ChunkExceedsArray { .. })
        ));
    }
}
