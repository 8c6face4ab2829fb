#![allow(missing_docs)]

use std::{
    collections::BTreeMap,
    io::{Seek, SeekFrom, Write},
    num::NonZeroUsize,
    sync::Mutex,
};

use chunkstream::{
    array::{array_shape_to_chunk_shape, DataType},
    array_subset::{ArraySubset, ContiguousLinearisedIndices},
    backend::{BackendConfiguration, BackendKind, DatasetTarget, InMemoryGraph},
    iterator::BufferIteratorBuilder,
    source::{MemmapArrayDescriptor, MemmapArraySource},
    write::{
        write_datasets, OutputGuard, SourceStream, StorageSink, WindowStream, WriteError,
    },
};

const LOCATION: &str = "acquisition/ElectricalSeries/data";
const FULL_SHAPE: [u64; 2] = [120, 8];

/// A sink writing one uncompressed dataset to a flat file.
struct FileSink {
    file: Mutex<std::fs::File>,
    full_shape: Vec<u64>,
    item_size: u64,
}

impl StorageSink for FileSink {
    fn store_window(
        &self,
        _location: &str,
        window: &ArraySubset,
        bytes: &[u8],
    ) -> Result<(), WriteError> {
        let mut file = self.file.lock().unwrap();
        let mut offset = 0usize;
        for (index, contiguous_elements) in
            ContiguousLinearisedIndices::new(window, &self.full_shape).iter()
        {
            let length = usize::try_from(contiguous_elements * self.item_size).unwrap();
            file.seek(SeekFrom::Start(index * self.item_size))?;
            file.write_all(&bytes[offset..offset + length])?;
            offset += length;
        }
        Ok(())
    }
}

/// A sink that fails every write.
struct FailingSink;

impl StorageSink for FailingSink {
    fn store_window(
        &self,
        _location: &str,
        _window: &ArraySubset,
        _bytes: &[u8],
    ) -> Result<(), WriteError> {
        Err(WriteError::Storage("store unavailable".to_string()))
    }
}

fn source_elements() -> Vec<u16> {
    (0..(FULL_SHAPE[0] * FULL_SHAPE[1]) as u16).collect()
}

fn write_source_file(dir: &tempfile::TempDir) -> MemmapArrayDescriptor {
    let path = dir.path().join("source.dat");
    std::fs::write(&path, bytemuck::cast_slice::<u16, u8>(&source_elements())).unwrap();
    MemmapArrayDescriptor {
        path,
        offset: 0,
        shape: FULL_SHAPE.to_vec(),
        data_type: DataType::UInt16,
    }
}

fn test_configuration(number_of_jobs: usize) -> BackendConfiguration {
    let graph = InMemoryGraph::new([DatasetTarget {
        location: LOCATION.to_string(),
        data_type: DataType::UInt16,
        full_shape: FULL_SHAPE.to_vec(),
    }]);
    let mut configuration = BackendConfiguration::default_for(&graph, BackendKind::Zarr).unwrap();
    let dataset = configuration.datasets.get_mut(LOCATION).unwrap();
    dataset.chunk_shape = array_shape_to_chunk_shape(&[25, 8]).unwrap();
    dataset.buffer_shape = vec![50, 8];
    configuration.number_of_jobs = NonZeroUsize::new(number_of_jobs).unwrap();
    configuration
}

fn streams_for(
    descriptor: MemmapArrayDescriptor,
    configuration: &BackendConfiguration,
) -> Vec<Box<dyn WindowStream>> {
    let dataset = &configuration.datasets[LOCATION];
    let source = MemmapArraySource::<u16>::open(descriptor).unwrap();
    let iterator = BufferIteratorBuilder::new()
        .chunk_shape(dataset.chunk_shape.clone())
        .buffer_shape(dataset.buffer_shape.clone())
        .build(source)
        .unwrap();
    vec![Box::new(SourceStream::new(LOCATION, iterator))]
}

fn write_to_file(number_of_jobs: usize) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_source_file(&dir);
    let configuration = test_configuration(number_of_jobs);

    let output = dir.path().join("output.dat");
    let guard = OutputGuard::new(&output);
    let file = std::fs::File::create(guard.path()).unwrap();
    file.set_len(FULL_SHAPE.iter().product::<u64>() * 2).unwrap();
    let sink = FileSink {
        file: Mutex::new(file),
        full_shape: FULL_SHAPE.to_vec(),
        item_size: 2,
    };

    let mut streams = streams_for(descriptor, &configuration);
    write_datasets(&sink, &configuration, &mut streams).unwrap();
    guard.commit();
    std::fs::read(&output).unwrap()
}

#[test]
fn memmap_to_file_round_trip() {
    let written = write_to_file(1);
    assert_eq!(written, bytemuck::cast_slice::<u16, u8>(&source_elements()));
}

#[test]
fn parallel_write_matches_serial() {
    assert_eq!(write_to_file(4), write_to_file(1));
}

#[test]
fn failed_write_removes_fresh_output() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_source_file(&dir);
    let configuration = test_configuration(1);
    let output = dir.path().join("output.dat");
    {
        let guard = OutputGuard::new(&output);
        std::fs::File::create(guard.path()).unwrap();
        let mut streams = streams_for(descriptor, &configuration);
        let result = write_datasets(&FailingSink, &configuration, &mut streams);
        assert!(matches!(result, Err(WriteError::Storage(_))));
        // The guard drops uncommitted.
    }
    assert!(!output.exists());
}

#[test]
fn failed_append_leaves_existing_output_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = write_source_file(&dir);
    let configuration = test_configuration(1);
    let output = dir.path().join("output.dat");
    let original = vec![7u8; 64];
    std::fs::write(&output, &original).unwrap();
    {
        let _guard = OutputGuard::new(&output);
        let mut streams = streams_for(descriptor, &configuration);
        let result = write_datasets(&FailingSink, &configuration, &mut streams);
        assert!(result.is_err());
    }
    assert_eq!(std::fs::read(&output).unwrap(), original);
}

#[test]
fn edited_configuration_round_trips_through_json() {
    let configuration = test_configuration(1);
    let mut json: serde_json::Value =
        serde_json::from_str(&configuration.to_string()).unwrap();

    // A user edits the serialized configuration before the write.
    json["datasets"][LOCATION]["compression"] =
        serde_json::json!({"backend": "zarr", "compression": {"name": "gzip", "level": 7}});
    json["number_of_jobs"] = serde_json::json!(8);

    let edited: BackendConfiguration = serde_json::from_value(json).unwrap();
    edited.validate().unwrap();
    assert_eq!(edited.number_of_jobs.get(), 8);
    assert_eq!(
        edited.datasets[LOCATION].compression,
        chunkstream::dataset::CompressionConfiguration::Zarr {
            compression: chunkstream::dataset::ZarrCompression::Gzip { level: 7 },
        }
    );
}

#[test]
fn unknown_compression_name_rejected_before_write() {
    use chunkstream::chunking::ConfigurationError;
    use chunkstream::dataset::CompressionConfiguration;

    let result = CompressionConfiguration::from_name(BackendKind::Zarr, "szip");
    assert!(matches!(
        result,
        Err(ConfigurationError::UnsupportedCompression {
            backend: "zarr",
            ..
        })
    ));
    // The supported set is discoverable per backend.
    assert!(BackendKind::Hdf5
        .supported_compression_names()
        .contains(&"szip"));
    assert!(!BackendKind::Zarr
        .supported_compression_names()
        .contains(&"szip"));
}

#[test]
fn default_configuration_shapes_are_ordered() {
    let targets = [
        ([10_000_000, 384].as_slice(), DataType::Int16),
        ([1000, 4].as_slice(), DataType::Int16),
        ([100_000, 512, 512].as_slice(), DataType::Float32),
    ];
    let graph = InMemoryGraph::new(targets.iter().enumerate().map(
        |(i, (shape, data_type))| DatasetTarget {
            location: format!("dataset_{i}"),
            data_type: *data_type,
            full_shape: shape.to_vec(),
        },
    ));
    let configuration = BackendConfiguration::default_for(&graph, BackendKind::Hdf5).unwrap();
    let mut sizes: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for (location, dataset) in &configuration.datasets {
        for ((chunk, buffer), full) in std::iter::zip(
            std::iter::zip(&dataset.chunk_shape, &dataset.buffer_shape),
            &dataset.full_shape,
        ) {
            assert!(1 <= chunk.get());
            assert!(chunk.get() <= *buffer);
            assert!(*buffer <= *full);
        }
        let chunk_bytes = dataset.chunk_shape.iter().map(|c| c.get()).product::<u64>()
            * dataset.data_type.size() as u64;
        let buffer_bytes = dataset.buffer_shape.iter().product::<u64>()
            * dataset.data_type.size() as u64;
        sizes.insert(location, (chunk_bytes, buffer_bytes));
        assert!(chunk_bytes <= 10_000_000);
        assert!(buffer_bytes <= 1_000_000_000);
    }
    // The tiny dataset is stored as a single chunk.
    assert_eq!(sizes["dataset_1"], (1000 * 4 * 2, 1000 * 4 * 2));
}
