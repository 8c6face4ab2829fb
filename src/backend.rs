//! Container-wide backend configuration.
//!
//! A [`BackendConfiguration`] maps every to-be-written dataset of a container
//! to a [`DatasetConfiguration`](crate::dataset::DatasetConfiguration) for a
//! single [`BackendKind`]. It is built against a [`ContainerGraph`], an
//! abstraction over the in-memory object tree of a container, with
//! [`BackendConfiguration::default_for`], optionally edited, and validated
//! against the same graph before any write occurs.

use std::{collections::BTreeMap, num::NonZeroUsize};

use serde::{Deserialize, Serialize};

use crate::{
    array::{ArrayShape, ChunkShape, DataType},
    chunking::{estimate_buffer_shape, estimate_chunk_shape, ConfigurationError},
    config::global_config,
    dataset::{CompressionConfiguration, DatasetConfiguration},
};

/// A chunked storage backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The HDF5 backend.
    Hdf5,
    /// The Zarr backend.
    Zarr,
}

impl BackendKind {
    /// Return the name of the backend.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hdf5 => "hdf5",
            Self::Zarr => "zarr",
        }
    }

    /// Return the names of the compression methods the backend supports.
    #[must_use]
    pub fn supported_compression_names(&self) -> &'static [&'static str] {
        match self {
            Self::Hdf5 => crate::dataset::Hdf5Compression::NAMES,
            Self::Zarr => crate::dataset::ZarrCompression::NAMES,
        }
    }

    /// Returns true if the backend supports concurrent chunk writes.
    ///
    /// HDF5 containers are written through a single handle; only Zarr stores
    /// permit writing independent chunks concurrently.
    #[must_use]
    pub fn supports_parallel_writes(&self) -> bool {
        matches!(self, Self::Zarr)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dataset within a container that is eligible for chunked storage
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetTarget {
    /// The location of the dataset within the container.
    pub location: String,
    /// The element type of the dataset.
    pub data_type: DataType,
    /// The shape of the full dataset.
    pub full_shape: ArrayShape,
}

/// The storage wrapper applied to a dataset in a [`ContainerGraph`].
///
/// Wrapping marks the dataset in the in-memory tree with the chunking and
/// compression it will be written with; the write itself happens later.
#[derive(Clone, Debug, PartialEq)]
pub struct WrappedDataset {
    /// The on-disk chunk shape.
    pub chunk_shape: ChunkShape,
    /// The in-memory buffer shape used while writing.
    pub buffer_shape: ArrayShape,
    /// The compression configuration.
    pub compression: CompressionConfiguration,
}

/// An in-memory object tree of a container.
///
/// The graph exposes the datasets eligible for configuration and records the
/// storage wrapper applied to each of them.
pub trait ContainerGraph {
    /// Return the datasets eligible for chunked storage configuration, in
    /// location order.
    fn dataset_targets(&self) -> Vec<DatasetTarget>;

    /// Return the locations of datasets already written to storage.
    ///
    /// Written datasets cannot be re-chunked; they are skipped when deriving
    /// defaults and rejected by validation. When appending to an existing
    /// container these are the datasets of the previous write.
    fn written_locations(&self) -> Vec<String>;

    /// Return the wrapper applied to the dataset at `location`, if any.
    fn wrapper(&self, location: &str) -> Option<&WrappedDataset>;

    /// Apply `wrapper` to the dataset at `location`, replacing any existing
    /// wrapper.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnknownDatasetLocation`] if no dataset
    /// exists at `location`.
    fn wrap_dataset(
        &mut self,
        location: &str,
        wrapper: WrappedDataset,
    ) -> Result<(), ConfigurationError>;
}

/// A [`ContainerGraph`] held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    targets: BTreeMap<String, DatasetTarget>,
    wrappers: BTreeMap<String, WrappedDataset>,
    written: std::collections::BTreeSet<String>,
}

impl InMemoryGraph {
    /// Create a graph from `targets`.
    #[must_use]
    pub fn new(targets: impl IntoIterator<Item = DatasetTarget>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|target| (target.location.clone(), target))
                .collect(),
            wrappers: BTreeMap::new(),
            written: std::collections::BTreeSet::new(),
        }
    }

    /// Mark the dataset at `location` as written to storage.
    pub fn mark_written(&mut self, location: &str) {
        self.written.insert(location.to_string());
    }
}

impl ContainerGraph for InMemoryGraph {
    fn dataset_targets(&self) -> Vec<DatasetTarget> {
        self.targets.values().cloned().collect()
    }

    fn written_locations(&self) -> Vec<String> {
        self.written.iter().cloned().collect()
    }

    fn wrapper(&self, location: &str) -> Option<&WrappedDataset> {
        self.wrappers.get(location)
    }

    fn wrap_dataset(
        &mut self,
        location: &str,
        wrapper: WrappedDataset,
    ) -> Result<(), ConfigurationError> {
        if !self.targets.contains_key(location) {
            return Err(ConfigurationError::UnknownDatasetLocation(
                location.to_string(),
            ));
        }
        self.wrappers.insert(location.to_string(), wrapper);
        Ok(())
    }
}

fn default_number_of_jobs() -> NonZeroUsize {
    NonZeroUsize::MIN
}

/// The storage configuration of every dataset in a container, for one backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendConfiguration {
    /// The backend the configuration applies to.
    pub backend: BackendKind,
    /// The per-dataset configurations, keyed by location.
    pub datasets: BTreeMap<String, DatasetConfiguration>,
    /// The number of concurrent chunk write jobs. Values above one require a
    /// backend with parallel write support.
    #[serde(default = "default_number_of_jobs")]
    pub number_of_jobs: NonZeroUsize,
}

impl BackendConfiguration {
    /// Build the default configuration for every dataset target of `graph`.
    ///
    /// Targets already written to storage or already wrapped are skipped.
    /// Chunk and buffer shapes are estimated against the
    /// [global configuration](crate::config) byte budgets and the compression
    /// is the backend default.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if shape estimation fails for any
    /// target.
    pub fn default_for(
        graph: &impl ContainerGraph,
        backend: BackendKind,
    ) -> Result<Self, ConfigurationError> {
        let (chunk_mb, buffer_gb) = {
            let config = global_config();
            (config.chunk_target_mb(), config.buffer_target_gb())
        };
        let written: std::collections::BTreeSet<String> =
            graph.written_locations().into_iter().collect();
        let mut datasets = BTreeMap::new();
        for target in graph.dataset_targets() {
            if written.contains(&target.location) || graph.wrapper(&target.location).is_some() {
                continue;
            }
            let chunk_shape =
                estimate_chunk_shape(&target.full_shape, target.data_type, chunk_mb)?;
            let buffer_shape = estimate_buffer_shape(
                buffer_gb,
                &chunk_shape,
                &target.full_shape,
                target.data_type,
            )?;
            datasets.insert(
                target.location.clone(),
                DatasetConfiguration {
                    location: target.location,
                    data_type: target.data_type,
                    full_shape: target.full_shape,
                    chunk_shape,
                    buffer_shape,
                    compression: CompressionConfiguration::default_for(backend),
                },
            );
        }
        Ok(Self {
            backend,
            datasets,
            number_of_jobs: default_number_of_jobs(),
        })
    }

    /// Validate the internal consistency of the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if any dataset violates the shape
    /// constraints, targets a different backend, or concurrency is requested
    /// on a backend without parallel write support.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.number_of_jobs.get() > 1 && !self.backend.supports_parallel_writes() {
            return Err(ConfigurationError::ParallelWritesUnsupported(
                self.backend.name(),
            ));
        }
        for (location, dataset) in &self.datasets {
            if dataset.backend() != self.backend {
                return Err(ConfigurationError::BackendMismatch {
                    location: location.clone(),
                    got: dataset.backend().name(),
                    expected: self.backend.name(),
                });
            }
            dataset.validate()?;
        }
        Ok(())
    }

    /// Validate the configuration against the datasets of `graph`.
    ///
    /// In addition to [`validate`](Self::validate), checks that every
    /// configured location exists in the graph with the same data type and
    /// full shape, and that none of them is already written (re-chunking
    /// written data is not supported).
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] naming the first violated constraint.
    pub fn validate_against(&self, graph: &impl ContainerGraph) -> Result<(), ConfigurationError> {
        self.validate()?;
        let targets: BTreeMap<String, DatasetTarget> = graph
            .dataset_targets()
            .into_iter()
            .map(|target| (target.location.clone(), target))
            .collect();
        let written: std::collections::BTreeSet<String> =
            graph.written_locations().into_iter().collect();
        for (location, dataset) in &self.datasets {
            let Some(target) = targets.get(location) else {
                return Err(ConfigurationError::UnknownDatasetLocation(location.clone()));
            };
            if written.contains(location) {
                return Err(ConfigurationError::AlreadyWritten(location.clone()));
            }
            if target.data_type != dataset.data_type || target.full_shape != dataset.full_shape {
                return Err(ConfigurationError::DatasetMismatch(location.clone()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for BackendConfiguration {
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
    use super::*;

    fn test_graph() -> InMemoryGraph {
        InMemoryGraph::new([
            DatasetTarget {
                location: "acquisition/ElectricalSeries/data".to_string(),
                data_type: DataType::Int16,
                full_shape: vec![1_000_000, 384],
            },
            DatasetTarget {
                location: "processing/ophys/Fluorescence/data".to_string(),
                data_type: DataType::Float32,
                full_shape: vec![100_000, 400],
            },
        ])
    }

    #[test]
    fn backend_configuration_defaults() {
        let graph = test_graph();
        let configuration =
            BackendConfiguration::default_for(&graph, BackendKind::Zarr).unwrap();
        assert_eq!(configuration.datasets.len(), 2);
        assert_eq!(configuration.number_of_jobs.get(), 1);
        configuration.validate_against(&graph).unwrap();
        for dataset in configuration.datasets.values() {
            assert_eq!(dataset.backend(), BackendKind::Zarr);
            for ((chunk, buffer), full) in std::iter::zip(
                std::iter::zip(&dataset.chunk_shape, &dataset.buffer_shape),
                &dataset.full_shape,
            ) {
                assert!(chunk.get() <= *buffer && *buffer <= *full);
            }
        }
    }

    #[test]
    fn backend_configuration_parallel_writes_zarr_only() {
        let graph = test_graph();
        let mut configuration =
            BackendConfiguration::default_for(&graph, BackendKind::Hdf5).unwrap();
        configuration.validate().unwrap();
        configuration.number_of_jobs = NonZeroUsize::new(4).unwrap();
        assert!(matches!(
            configuration.validate(),
            Err(ConfigurationError::ParallelWritesUnsupported("hdf5"))
        ));

        let mut configuration =
            BackendConfiguration::default_for(&graph, BackendKind::Zarr).unwrap();
        configuration.number_of_jobs = NonZeroUsize::new(4).unwrap();
        configuration.validate().unwrap();
    }

    #[test]
    fn backend_configuration_backend_mismatch() {
        let graph = test_graph();
        let mut configuration =
            BackendConfiguration::default_for(&graph, BackendKind::Zarr).unwrap();
        let location = "acquisition/ElectricalSeries/data";
        configuration.datasets.get_mut(location).unwrap().compression =
            CompressionConfiguration::default_for(BackendKind::Hdf5);
        assert!(matches!(
            configuration.validate(),
            Err(ConfigurationError::BackendMismatch { .. })
        ));
    }

    #[test]
    fn backend_configuration_validate_against_graph() {
        let graph = test_graph();
        let mut configuration =
            BackendConfiguration::default_for(&graph, BackendKind::Zarr).unwrap();

        // An edited configuration that no longer matches the container.
        configuration
            .datasets
            .get_mut("acquisition/ElectricalSeries/data")
            .unwrap()
            .data_type = DataType::Float64;
        assert!(matches!(
            configuration.validate_against(&graph),
            Err(ConfigurationError::DatasetMismatch(_))
        ));

        // A location the container does not have.
        let configuration =
            BackendConfiguration::default_for(&test_graph(), BackendKind::Zarr).unwrap();
        let empty = InMemoryGraph::default();
        assert!(matches!(
            configuration.validate_against(&empty),
            Err(ConfigurationError::UnknownDatasetLocation(_))
        ));
    }

    #[test]
    fn backend_configuration_skips_written_datasets() {
        let mut graph = test_graph();
        graph.mark_written("acquisition/ElectricalSeries/data");
        let configuration =
            BackendConfiguration::default_for(&graph, BackendKind::Zarr).unwrap();
        assert_eq!(configuration.datasets.len(), 1);
        assert!(configuration
            .datasets
            .contains_key("processing/ophys/Fluorescence/data"));
        configuration.validate_against(&graph).unwrap();

        // Re-chunking an already written dataset is rejected.
        let fresh = test_graph();
        let full = BackendConfiguration::default_for(&fresh, BackendKind::Zarr).unwrap();
        assert!(matches!(
            full.validate_against(&graph),
            Err(ConfigurationError::AlreadyWritten(_))
        ));
    }

    #[test]
    fn backend_configuration_json_round_trip() {
        let configuration =
            BackendConfiguration::default_for(&test_graph(), BackendKind::Hdf5).unwrap();
        let json = configuration.to_string();
        let recovered: BackendConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, configuration);
    }

    #[test]
    fn in_memory_graph_wrap() {
        let mut graph = test_graph();
        let location = "acquisition/ElectricalSeries/data";
        assert!(graph.wrapper(location).is_none());
        let wrapper = WrappedDataset {
            chunk_shape: crate::array::array_shape_to_chunk_shape(&[100_000, 64]).unwrap(),
            buffer_shape: vec![1_000_000, 384],
            compression: CompressionConfiguration::default_for(BackendKind::Zarr),
        };
        graph.wrap_dataset(location, wrapper.clone()).unwrap();
        assert_eq!(graph.wrapper(location), Some(&wrapper));
        assert!(matches!(
            graph.wrap_dataset("missing", wrapper),
            Err(ConfigurationError::UnknownDatasetLocation(_))
        ));
    }
}
