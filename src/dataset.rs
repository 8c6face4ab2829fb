//! Per-dataset storage configuration.
//!
//! A [`DatasetConfiguration`] holds everything needed to create one chunked,
//! compressed dataset in a container: its location, data type, full shape,
//! chunk and buffer shapes, and a backend-specific
//! [`CompressionConfiguration`]. Configurations serialize to and from JSON so
//! they can be persisted, diffed, and edited before a write.

pub mod hdf5;
pub mod zarr;

pub use hdf5::{Hdf5Compression, Hdf5Filter};
pub use zarr::{BloscShuffleMode, ZarrCompression};

use serde::{Deserialize, Serialize};

use crate::{
    array::{ArrayShape, ChunkShape, DataType},
    backend::BackendKind,
    chunking::ConfigurationError,
};

/// A backend-specific compression configuration.
///
/// The variant fixes the backend a [`DatasetConfiguration`] can be applied to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CompressionConfiguration {
    /// HDF5 compression and filters.
    Hdf5 {
        /// The compression method.
        compression: Hdf5Compression,
        /// Filters applied before compression, in order.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filters: Vec<Hdf5Filter>,
    },
    /// Zarr compression.
    Zarr {
        /// The compression method.
        compression: ZarrCompression,
    },
}

impl CompressionConfiguration {
    /// Return the backend this compression configuration applies to.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Hdf5 { .. } => BackendKind::Hdf5,
            Self::Zarr { .. } => BackendKind::Zarr,
        }
    }

    /// Create the default compression configuration for `backend`.
    #[must_use]
    pub fn default_for(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Hdf5 => Self::Hdf5 {
                compression: Hdf5Compression::default(),
                filters: Vec::new(),
            },
            BackendKind::Zarr => Self::Zarr {
                compression: ZarrCompression::default(),
            },
        }
    }

    /// Create a compression configuration from a method name for `backend`.
    ///
    /// Method parameters take their default values; adjust them on the
    /// returned configuration if needed.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnsupportedCompression`] if `backend`
    /// does not support a method called `name`.
    pub fn from_name(backend: BackendKind, name: &str) -> Result<Self, ConfigurationError> {
        match backend {
            BackendKind::Hdf5 => Ok(Self::Hdf5 {
                compression: Hdf5Compression::from_name(name)?,
                filters: Vec::new(),
            }),
            BackendKind::Zarr => Ok(Self::Zarr {
                compression: ZarrCompression::from_name(name)?,
            }),
        }
    }
}

/// The storage configuration of one dataset within a container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfiguration {
    /// The location of the dataset within the container, e.g.
    /// `acquisition/ElectricalSeries/data`.
    pub location: String,
    /// The element type of the dataset.
    pub data_type: DataType,
    /// The shape of the full dataset.
    pub full_shape: ArrayShape,
    /// The on-disk chunk shape.
    pub chunk_shape: ChunkShape,
    /// The in-memory buffer shape used while writing.
    pub buffer_shape: ArrayShape,
    /// The compression configuration. Its variant fixes the backend.
    pub compression: CompressionConfiguration,
}

impl DatasetConfiguration {
    /// Return the backend this configuration applies to.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.compression.backend()
    }

    /// Validate the shape relationships of this configuration.
    ///
    /// Checks that all shapes share a dimensionality and that
    /// `1 <= chunk_shape[i] <= buffer_shape[i] <= full_shape[i]` on every
    /// axis.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.full_shape.is_empty() {
            return Err(ConfigurationError::EmptyShape);
        }
        if self.chunk_shape.len() != self.full_shape.len() {
            return Err(crate::array_subset::IncompatibleDimensionalityError::new(
                self.chunk_shape.len(),
                self.full_shape.len(),
            )
            .into());
        }
        if self.buffer_shape.len() != self.full_shape.len() {
            return Err(crate::array_subset::IncompatibleDimensionalityError::new(
                self.buffer_shape.len(),
                self.full_shape.len(),
            )
            .into());
        }
        for (axis, ((chunk, &buffer), &full)) in std::iter::zip(
            std::iter::zip(&self.chunk_shape, &self.buffer_shape),
            &self.full_shape,
        )
        .enumerate()
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
}

impl std::fmt::Display for DatasetConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string(self).map_err(|_| std::fmt::Error)?
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::array::array_shape_to_chunk_shape;

    use super::*;

    fn test_configuration() -> DatasetConfiguration {
        DatasetConfiguration {
            location: "acquisition/ElectricalSeries/data".to_string(),
            data_type: DataType::Int16,
            full_shape: vec![1_000_000, 384],
            chunk_shape: array_shape_to_chunk_shape(&[100_000, 64]).unwrap(),
            buffer_shape: vec![1_000_000, 384],
            compression: CompressionConfiguration::default_for(BackendKind::Zarr),
        }
    }

    #[test]
    fn dataset_configuration_json_round_trip() {
        let configuration = test_configuration();
        let json = configuration.to_string();
        let recovered: DatasetConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, configuration);
        assert_eq!(recovered.backend(), BackendKind::Zarr);
    }

    #[test]
    fn dataset_configuration_validate() {
        let mut configuration = test_configuration();
        configuration.validate().unwrap();

        configuration.buffer_shape = vec![50_000, 384];
        assert!(matches!(
            configuration.validate(),
            Err(ConfigurationError::ChunkExceedsBuffer { axis: 0, .. })
        ));

        configuration.buffer_shape = vec![2_000_000, 384];
        assert!(matches!(
            configuration.validate(),
            Err(ConfigurationError::BufferExceedsArray { axis: 0, .. })
        ));

        configuration.buffer_shape = vec![1_000_000];
        assert!(matches!(
            configuration.validate(),
            Err(ConfigurationError::IncompatibleDimensionality(_))
        ));
    }

    #[test]
    fn compression_from_name() {
        assert_eq!(
            CompressionConfiguration::from_name(BackendKind::Hdf5, "gzip").unwrap(),
            CompressionConfiguration::Hdf5 {
                compression: Hdf5Compression::Gzip { level: 4 },
                filters: Vec::new(),
            }
        );
        assert!(matches!(
            CompressionConfiguration::from_name(BackendKind::Hdf5, "blosc"),
            Err(ConfigurationError::UnsupportedCompression {
                backend: "hdf5",
                ..
            })
        ));
        assert!(matches!(
            CompressionConfiguration::from_name(BackendKind::Zarr, "lzf"),
            Err(ConfigurationError::UnsupportedCompression {
                backend: "zarr",
                ..
            })
        ));
    }
}
