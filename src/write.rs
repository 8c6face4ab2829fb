//! Writing configured datasets to a storage backend.
//!
//! The write path has two phases:
//!  1. [`configure_backend`] applies a validated
//!     [`BackendConfiguration`] to a [`ContainerGraph`], wrapping every
//!     configured dataset with its chunking and compression. This phase is
//!     idempotent and performs no I/O.
//!  2. [`write_datasets`] pulls buffer windows from a set of
//!     [`WindowStream`]s, decomposes each window into chunk-grid-aligned
//!     chunks, and stores them through a [`StorageSink`]. On backends with
//!     parallel write support the chunks of a buffer are stored concurrently.
//!
//! An [`OutputGuard`] makes writes to fresh output paths all-or-nothing:
//! unless committed, a path created for this write is removed when the guard
//! drops, while a pre-existing path being appended to is never touched.

use std::path::{Path, PathBuf};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;
use thiserror::Error;

use crate::{
    array::{chunk_shape_to_array_shape, DataType},
    array_subset::{ArraySubset, ContiguousLinearisedIndices, Windows},
    backend::{BackendConfiguration, ContainerGraph, WrappedDataset},
    chunking::ConfigurationError,
    iterator::{BufferIterator, IterationError},
    source::LazySource,
};

/// A dataset write error.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The configuration was invalid or conflicting.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A source failed while producing a window.
    #[error(transparent)]
    Iteration(#[from] IterationError),
    /// An I/O error from the underlying store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A failure reported by the storage backend.
    #[error("storage backend error: {_0}")]
    Storage(String),
}

/// Apply `configuration` to `graph`, wrapping every configured dataset.
///
/// Wrapping a dataset that already carries an identical wrapper is a no-op,
/// so re-applying the same configuration is safe. A dataset already wrapped
/// with a *different* configuration is a conflict and fails before any
/// wrapper is replaced.
///
/// # Errors
/// Returns a [`ConfigurationError`] if the configuration does not validate
/// against `graph` or conflicts with an existing wrapper.
pub fn configure_backend(
    graph: &mut impl ContainerGraph,
    configuration: &BackendConfiguration,
) -> Result<(), ConfigurationError> {
    configuration.validate_against(graph)?;

    // Detect conflicts before mutating anything.
    for (location, dataset) in &configuration.datasets {
        if let Some(existing) = graph.wrapper(location) {
            if existing.chunk_shape != dataset.chunk_shape
                || existing.buffer_shape != dataset.buffer_shape
                || existing.compression != dataset.compression
            {
                return Err(ConfigurationError::WrapConflict(location.clone()));
            }
        }
    }
    for (location, dataset) in &configuration.datasets {
        if graph.wrapper(location).is_some() {
            log::debug!("dataset {location} is already wrapped, skipping");
            continue;
        }
        graph.wrap_dataset(
            location,
            WrappedDataset {
                chunk_shape: dataset.chunk_shape.clone(),
                buffer_shape: dataset.buffer_shape.clone(),
                compression: dataset.compression.clone(),
            },
        )?;
    }
    Ok(())
}

/// A type-erased stream of buffer windows for one dataset.
///
/// Erasing the element type lets [`write_datasets`] drive streams of mixed
/// data types through one call; window data crosses the boundary as raw
/// little-endian bytes.
pub trait WindowStream {
    /// Return the location of the dataset this stream writes to.
    fn location(&self) -> &str;

    /// Return the element type of the stream.
    fn data_type(&self) -> DataType;

    /// Return the next buffer window and its data as bytes, or [`None`] when
    /// the stream is exhausted.
    fn next_window(&mut self) -> Option<Result<(ArraySubset, Vec<u8>), IterationError>>;

    /// Decompose a buffer window into the chunk windows tiling it.
    fn chunk_windows(&self, buffer_window: &ArraySubset) -> Windows;
}

/// A [`WindowStream`] over a [`BufferIterator`].
pub struct SourceStream<S: LazySource> {
    location: String,
    iterator: BufferIterator<S>,
}

impl<S: LazySource> SourceStream<S> {
    /// Create a stream writing `iterator` to the dataset at `location`.
    #[must_use]
    pub fn new(location: impl Into<String>, iterator: BufferIterator<S>) -> Self {
        Self {
            location: location.into(),
            iterator,
        }
    }
}

impl<S: LazySource> WindowStream for SourceStream<S> {
    fn location(&self) -> &str {
        &self.location
    }

    fn data_type(&self) -> DataType {
        <S::Elem as crate::array::Element>::DATA_TYPE
    }

    fn next_window(&mut self) -> Option<Result<(ArraySubset, Vec<u8>), IterationError>> {
        let item = self.iterator.next()?;
        Some(item.map(|(window, data)| {
            let data = data.as_standard_layout();
            let bytes = bytemuck::cast_slice::<S::Elem, u8>(
                data.as_slice().expect("standard layout arrays are contiguous"),
            )
            .to_vec();
            (window, bytes)
        }))
    }

    fn chunk_windows(&self, buffer_window: &ArraySubset) -> Windows {
        self.iterator.chunk_windows(buffer_window)
    }
}

/// An open storage backend receiving window bytes.
///
/// Implementations must support storing distinct windows concurrently; a
/// backend that cannot is used with one write job, so `store_window` is never
/// entered concurrently for it.
pub trait StorageSink: Send + Sync {
    /// Store `bytes` as the data of `window` of the dataset at `location`.
    ///
    /// # Errors
    /// Returns a [`WriteError`] if the store rejects or fails the write.
    fn store_window(
        &self,
        location: &str,
        window: &ArraySubset,
        bytes: &[u8],
    ) -> Result<(), WriteError>;
}

/// Copy the bytes of `window` out of the data of `buffer_window`.
fn extract_window_bytes(
    buffer_bytes: &[u8],
    buffer_window: &ArraySubset,
    window: &ArraySubset,
    item_size: usize,
) -> Result<Vec<u8>, ConfigurationError> {
    let relative = window.relative_to(buffer_window)?;
    let mut bytes = Vec::with_capacity(relative.num_elements_usize() * item_size);
    for (index, contiguous_elements) in
        ContiguousLinearisedIndices::new(&relative, buffer_window.shape()).iter()
    {
        let offset = usize::try_from(index).unwrap() * item_size;
        let length = usize::try_from(contiguous_elements).unwrap() * item_size;
        bytes.extend_from_slice(&buffer_bytes[offset..offset + length]);
    }
    Ok(bytes)
}

/// Write every stream in `streams` to `sink` under `configuration`.
///
/// Streams are drained in order; the buffer windows of each stream are pulled
/// serially (sources may be forward-only) and decomposed into chunk windows
/// aligned to the global chunk grid. With more than one write job configured,
/// the chunks of a buffer are stored concurrently, bounded by the larger of
/// the job count and the
/// [chunk concurrent minimum](crate::config::Config::chunk_concurrent_minimum).
///
/// # Errors
/// Returns a [`WriteError`] on the first configuration, source, or storage
/// failure.
pub fn write_datasets(
    sink: &(impl StorageSink + ?Sized),
    configuration: &BackendConfiguration,
    streams: &mut [Box<dyn WindowStream + '_>],
) -> Result<(), WriteError> {
    configuration.validate()?;
    let concurrent_chunks = if configuration.number_of_jobs.get() > 1 {
        configuration
            .number_of_jobs
            .get()
            .max(crate::config::global_config().chunk_concurrent_minimum())
    } else {
        1
    };

    for stream in streams {
        let Some(dataset) = configuration.datasets.get(stream.location()) else {
            return Err(
                ConfigurationError::UnknownDatasetLocation(stream.location().to_string()).into(),
            );
        };
        let item_size = stream.data_type().size();
        log::debug!(
            "writing dataset {} with chunk shape {:?}",
            dataset.location,
            chunk_shape_to_array_shape(&dataset.chunk_shape)
        );

        while let Some(item) = stream.next_window() {
            let (buffer_window, buffer_bytes) = item?;
            log::debug!("writing {} window {buffer_window}", stream.location());
            let chunks = stream.chunk_windows(&buffer_window);
            let location = stream.location();
            if concurrent_chunks > 1 {
                let chunk_windows: Vec<ArraySubset> =
                    chunks.iter().map(|(_, window)| window).collect();
                iter_concurrent_limit!(
                    concurrent_chunks,
                    chunk_windows,
                    try_for_each,
                    |chunk_window: ArraySubset| {
                        let chunk_bytes = extract_window_bytes(
                            &buffer_bytes,
                            &buffer_window,
                            &chunk_window,
                            item_size,
                        )?;
                        sink.store_window(location, &chunk_window, &chunk_bytes)
                    }
                )?;
            } else {
                for (_, chunk_window) in &chunks {
                    let chunk_bytes = extract_window_bytes(
                        &buffer_bytes,
                        &buffer_window,
                        &chunk_window,
                        item_size,
                    )?;
                    sink.store_window(location, &chunk_window, &chunk_bytes)?;
                }
            }
        }
    }
    Ok(())
}

/// All-or-nothing protection for an output path.
///
/// Create the guard *before* opening or creating the output. If the path did
/// not exist at guard creation and [`commit`](Self::commit) is never called,
/// dropping the guard removes whatever was created at the path. A path that
/// already existed (an append target) is never removed.
#[must_use]
pub struct OutputGuard {
    path: PathBuf,
    preexisting: bool,
    committed: bool,
}

impl OutputGuard {
    /// Create a guard for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            preexisting: path.exists(),
            path,
            committed: false,
        }
    }

    /// Return the guarded path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the path existed when the guard was created.
    #[must_use]
    pub fn preexisting(&self) -> bool {
        self.preexisting
    }

    /// Mark the write complete, keeping the output.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed || self.preexisting || !self.path.exists() {
            return;
        }
        log::debug!("removing incomplete output {}", self.path.display());
        let result = if self.path.is_dir() {
            std::fs::remove_dir_all(&self.path)
        } else {
            std::fs::remove_file(&self.path)
        };
        if let Err(err) = result {
            log::warn!(
                "failed to remove incomplete output {}: {err}",
                self.path.display()
            );
        }
    }
}
