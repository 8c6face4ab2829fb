//! Buffered iteration over lazy sources.
//!
//! A [`BufferIterator`] wraps a [`LazySource`] and yields its data as a
//! sequence of buffer windows in row-major (C-contiguous) order. Every window
//! is paired with the [`ArraySubset`] addressing its position in the full
//! array, so a consumer can place it without tracking any iteration state of
//! its own.
//!
//! Iterators are assembled with a [`BufferIteratorBuilder`], which accepts
//! either explicit chunk/buffer shapes or byte budgets (estimated via
//! [`crate::chunking`]), but never both for the same parameter.

use ndarray::ArrayD;
use thiserror::Error;

use crate::{
    array::{chunk_shape_to_array_shape, unravel_index, ArrayShape, ChunkShape, Element},
    array_subset::{ArraySubset, Windows},
    chunking::{estimate_buffer_shape, estimate_chunk_shape, ConfigurationError},
    config::global_config,
    source::{LazySource, SourceError},
};

/// A source returned a window with a shape other than the one requested.
#[derive(Clone, Debug, Error)]
#[error("source returned a window of shape {got:?}, expected {expected:?}")]
pub struct DimensionMismatchError {
    /// The requested window shape.
    pub expected: ArrayShape,
    /// The shape the source returned.
    pub got: ArrayShape,
}

/// An error while iterating over a lazy source.
#[derive(Debug, Error)]
pub enum IterationError {
    /// The source failed to produce a window.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The source produced a window of the wrong shape.
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatchError),
}

/// Builder for a [`BufferIterator`].
///
/// For each of the chunk and buffer shapes, supply an explicit shape *or* a
/// byte budget, not both. Parameters left unset default to budget estimation
/// with the [global configuration](crate::config) targets.
#[derive(Debug, Default)]
#[must_use]
pub struct BufferIteratorBuilder {
    chunk_shape: Option<ChunkShape>,
    chunk_mb: Option<f64>,
    buffer_shape: Option<ArrayShape>,
    buffer_gb: Option<f64>,
    progress: bool,
}

impl BufferIteratorBuilder {
    /// Create a new builder with all parameters unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit chunk shape.
    pub fn chunk_shape(mut self, chunk_shape: ChunkShape) -> Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    /// Set a chunk byte budget in megabytes.
    pub fn chunk_mb(mut self, chunk_mb: f64) -> Self {
        self.chunk_mb = Some(chunk_mb);
        self
    }

    /// Set an explicit buffer shape.
    pub fn buffer_shape(mut self, buffer_shape: ArrayShape) -> Self {
        self.buffer_shape = Some(buffer_shape);
        self
    }

    /// Set a buffer byte budget in gigabytes.
    pub fn buffer_gb(mut self, buffer_gb: f64) -> Self {
        self.buffer_gb = Some(buffer_gb);
        self
    }

    /// Display an [`indicatif`] progress bar over the buffer windows.
    pub fn display_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    /// Build a [`BufferIterator`] over `source`.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if both a shape and a budget were
    /// supplied for the same parameter, or the resolved shapes violate
    /// `1 <= chunk <= buffer <= full` on any axis.
    pub fn build<S: LazySource>(
        self,
        source: S,
    ) -> Result<BufferIterator<S>, ConfigurationError> {
        let full_shape = source.full_shape();
        let data_type = <S::Elem as Element>::DATA_TYPE;

        let chunk_shape = match (self.chunk_shape, self.chunk_mb) {
            (Some(_), Some(_)) => {
                return Err(ConfigurationError::ConflictingShapeArguments("chunk"));
            }
            (Some(chunk_shape), None) => chunk_shape,
            (None, chunk_mb) => {
                let chunk_mb =
                    chunk_mb.unwrap_or_else(|| global_config().chunk_target_mb());
                estimate_chunk_shape(&full_shape, data_type, chunk_mb)?
            }
        };
        let buffer_shape = match (self.buffer_shape, self.buffer_gb) {
            (Some(_), Some(_)) => {
                return Err(ConfigurationError::ConflictingShapeArguments("buffer"));
            }
            (Some(buffer_shape), None) => buffer_shape,
            (None, buffer_gb) => {
                let buffer_gb =
                    buffer_gb.unwrap_or_else(|| global_config().buffer_target_gb());
                estimate_buffer_shape(buffer_gb, &chunk_shape, &full_shape, data_type)?
            }
        };
        validate_shapes(&chunk_shape, &buffer_shape, &full_shape)?;

        let grid_shape: ArrayShape = std::iter::zip(&full_shape, &buffer_shape)
            .map(|(&full, &buffer)| full.div_ceil(buffer))
            .collect();
        let num_windows = grid_shape.iter().product();
        let progress = self
            .progress
            .then(|| indicatif::ProgressBar::new(num_windows));
        Ok(BufferIterator {
            source,
            full_shape,
            chunk_shape,
            buffer_shape,
            grid_shape,
            index: 0,
            num_windows,
            progress,
        })
    }
}

fn validate_shapes(
    chunk_shape: &ChunkShape,
    buffer_shape: &[u64],
    full_shape: &[u64],
) -> Result<(), ConfigurationError> {
    if chunk_shape.len() != full_shape.len() {
        return Err(crate::array_subset::IncompatibleDimensionalityError::new(
            chunk_shape.len(),
            full_shape.len(),
        )
        .into());
    }
    if buffer_shape.len() != full_shape.len() {
        return Err(crate::array_subset::IncompatibleDimensionalityError::new(
            buffer_shape.len(),
            full_shape.len(),
        )
        .into());
    }
    for (axis, ((chunk, &buffer), &full)) in
        std::iter::zip(std::iter::zip(chunk_shape, buffer_shape), full_shape).enumerate()
    {
        let chunk = chunk.get();
        if chunk > full {
            return Err(ConfigurationError::ChunkExceedsArray { axis, chunk, full });
        }
        if chunk > buffer {
            return Err(ConfigurationError::ChunkExceedsBuffer {
                axis,
                chunk,
                buffer,
            });
        }
        if buffer > full {
            return Err(ConfigurationError::BufferExceedsArray { axis, buffer, full });
        }
    }
    Ok(())
}

/// A fused iterator over the buffer windows of a [`LazySource`].
///
/// Yields `(ArraySubset, ArrayD)` pairs in row-major order over the buffer
/// grid. Windows at the array boundary are truncated to the array extent,
/// never padded; away from the boundary every buffer axis is a whole multiple
/// of the chunk axis, so the chunks within a buffer align with the global
/// chunk grid.
///
/// Forward-only sources rely on this ordering: windows are requested in
/// ascending position along the first axis.
pub struct BufferIterator<S: LazySource> {
    source: S,
    full_shape: ArrayShape,
    chunk_shape: ChunkShape,
    buffer_shape: ArrayShape,
    grid_shape: ArrayShape,
    index: u64,
    num_windows: u64,
    progress: Option<indicatif::ProgressBar>,
}

impl<S: LazySource> BufferIterator<S> {
    /// Return the shape of the full logical array.
    #[must_use]
    pub fn full_shape(&self) -> &ArrayShape {
        &self.full_shape
    }

    /// Return the resolved chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &ChunkShape {
        &self.chunk_shape
    }

    /// Return the resolved buffer shape.
    #[must_use]
    pub fn buffer_shape(&self) -> &ArrayShape {
        &self.buffer_shape
    }

    /// Return the total number of buffer windows.
    #[must_use]
    pub fn num_windows(&self) -> u64 {
        self.num_windows
    }

    /// Decompose a buffer window into the chunk windows tiling it.
    ///
    /// Chunk windows are clipped to the buffer window extent, so boundary
    /// chunks are truncated exactly as the buffer windows themselves are.
    ///
    /// # Panics
    /// Panics if `buffer_window` does not match the iterator dimensionality.
    #[must_use]
    pub fn chunk_windows(&self, buffer_window: &ArraySubset) -> Windows {
        buffer_window
            .windows(&chunk_shape_to_array_shape(&self.chunk_shape))
            .expect("buffer windows share the iterator dimensionality")
    }

    /// Consume the iterator, returning the wrapped source.
    #[must_use]
    pub fn into_source(self) -> S {
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        self.source
    }

    fn window_at(&self, index: u64) -> ArraySubset {
        let grid_indices = unravel_index(index, &self.grid_shape);
        let start: Vec<u64> = std::iter::zip(&grid_indices, &self.buffer_shape)
            .map(|(&grid, &buffer)| grid * buffer)
            .collect();
        let end: Vec<u64> = itertools::izip!(&start, &self.buffer_shape, &self.full_shape)
            .map(|(&start, &buffer, &full)| std::cmp::min(start + buffer, full))
            .collect();
        ArraySubset::new_with_start_end_exc(start, end)
            .expect("window constructed with grid dimensionality")
    }
}

impl<S: LazySource> Iterator for BufferIterator<S> {
    type Item = Result<(ArraySubset, ArrayD<S::Elem>), IterationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.num_windows {
            if let Some(progress) = &self.progress {
                progress.finish_and_clear();
            }
            return None;
        }
        let window = self.window_at(self.index);
        self.index += 1;

        let data = match self.source.fetch_window(&window) {
            Ok(data) => data,
            Err(err) => {
                // A failed fetch ends the iteration.
                self.index = self.num_windows;
                return Some(Err(err.into()));
            }
        };
        let got: ArrayShape = data.shape().iter().map(|&size| size as u64).collect();
        if got != window.shape() {
            self.index = self.num_windows;
            return Some(Err(DimensionMismatchError {
                expected: window.shape().to_vec(),
                got,
            }
            .into()));
        }
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        Some(Ok((window, data)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.num_windows - self.index).unwrap();
        (remaining, Some(remaining))
    }
}

impl<S: LazySource> ExactSizeIterator for BufferIterator<S> {}

impl<S: LazySource> std::iter::FusedIterator for BufferIterator<S> {}
