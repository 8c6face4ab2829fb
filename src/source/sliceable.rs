//! Randomly-sliceable sources.
//!
//! Any in-memory [`ndarray::ArrayD`] is a [`LazySource`] with a direct
//! pass-through fetch. [`MemmapArraySource`] extends this to flat binary files
//! via a read-only memory map that is *reconstructible*: only its
//! [`MemmapArrayDescriptor`] (path, offset, shape, data type) crosses process
//! boundaries, never the mapping itself.

use std::{fs::File, marker::PhantomData, path::PathBuf};

use ndarray::{ArrayD, IxDyn, Slice};
use serde::{Deserialize, Serialize};

use crate::{
    array::{ArrayShape, DataType, Element},
    array_subset::{ArraySubset, ContiguousLinearisedIndices},
};

use super::{LazySource, SourceError};

impl<T: Element> LazySource for ArrayD<T> {
    type Elem = T;

    fn full_shape(&self) -> ArrayShape {
        self.shape().iter().map(|&size| size as u64).collect()
    }

    fn fetch_window(&mut self, selection: &ArraySubset) -> Result<ArrayD<T>, SourceError> {
        let full_shape = LazySource::full_shape(self);
        if selection.dimensionality() != full_shape.len() || !selection.inbounds(&full_shape) {
            return Err(SourceError::InvalidSelection(selection.clone(), full_shape));
        }
        let window = self.slice_each_axis(|axis| {
            let start = selection.start()[axis.axis.index()];
            let end = start + selection.shape()[axis.axis.index()];
            Slice::new(
                isize::try_from(start).unwrap(),
                Some(isize::try_from(end).unwrap()),
                1,
            )
        });
        Ok(window.to_owned())
    }
}

/// A serializable description of a memory-mapped flat binary array.
///
/// This is the unit of cross-process transfer for [`MemmapArraySource`]: a
/// worker reconstructs the mapping with [`MemmapArraySource::open`] instead of
/// receiving a live file handle.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemmapArrayDescriptor {
    /// Path of the backing file.
    pub path: PathBuf,
    /// Byte offset of the first element within the file.
    pub offset: u64,
    /// Shape of the array, C-contiguous from `offset`.
    pub shape: ArrayShape,
    /// Data type of the elements.
    pub data_type: DataType,
}

/// A [`LazySource`] over a memory-mapped flat binary file.
pub struct MemmapArraySource<T: Element> {
    descriptor: MemmapArrayDescriptor,
    map: memmap2::Mmap,
    marker: PhantomData<T>,
}

impl<T: Element> MemmapArraySource<T> {
    /// Map the file described by `descriptor`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the descriptor's data type does not match
    /// `T`, the file cannot be opened or mapped, or the file is too short for
    /// the described array.
    pub fn open(descriptor: MemmapArrayDescriptor) -> Result<Self, SourceError> {
        if descriptor.data_type != T::DATA_TYPE {
            return Err(SourceError::DataTypeMismatch(
                descriptor.data_type,
                T::DATA_TYPE,
            ));
        }
        let file = File::open(&descriptor.path)?;
        // Safety of the mapping relies on the file not being truncated while
        // mapped; callers own that contract.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        let needed = descriptor.offset
            + descriptor.shape.iter().product::<u64>() * T::DATA_TYPE.size() as u64;
        if (map.len() as u64) < needed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "file {} holds {} bytes but the descriptor needs {needed}",
                    descriptor.path.display(),
                    map.len()
                ),
            )
            .into());
        }
        Ok(Self {
            descriptor,
            map,
            marker: PhantomData,
        })
    }

    /// Return the descriptor from which this source can be reconstructed.
    #[must_use]
    pub fn descriptor(&self) -> &MemmapArrayDescriptor {
        &self.descriptor
    }
}

impl<T: Element> LazySource for MemmapArraySource<T> {
    type Elem = T;

    fn full_shape(&self) -> ArrayShape {
        self.descriptor.shape.clone()
    }

    fn fetch_window(&mut self, selection: &ArraySubset) -> Result<ArrayD<T>, SourceError> {
        let full_shape = &self.descriptor.shape;
        if selection.dimensionality() != full_shape.len() || !selection.inbounds(full_shape) {
            return Err(SourceError::InvalidSelection(
                selection.clone(),
                full_shape.clone(),
            ));
        }
        let item_size = T::DATA_TYPE.size() as u64;
        let mut elements = Vec::with_capacity(selection.num_elements_usize());
        for (index, contiguous_elements) in
            ContiguousLinearisedIndices::new(selection, full_shape).iter()
        {
            let byte_start =
                usize::try_from(self.descriptor.offset + index * item_size).unwrap();
            let byte_length = usize::try_from(contiguous_elements * item_size).unwrap();
            // pod_collect_to_vec tolerates the arbitrary alignment of an
            // offset mapping.
            elements.extend(bytemuck::pod_collect_to_vec::<u8, T>(
                &self.map[byte_start..byte_start + byte_length],
            ));
        }
        ArrayD::from_shape_vec(IxDyn(&selection.shape_usize()), elements)
            .map_err(|err| SourceError::Decoder(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn array_source_pass_through() {
        let mut array =
            ArrayD::from_shape_vec(IxDyn(&[3, 4]), (0u32..12).collect::<Vec<_>>()).unwrap();
        let selection = ArraySubset::new_with_start_shape(vec![1, 1], vec![2, 2]).unwrap();
        let window = array.fetch_window(&selection).unwrap();
        assert_eq!(window.shape(), &[2, 2]);
        assert_eq!(window[[0, 0]], 5);
        assert_eq!(window[[1, 1]], 10);
    }

    #[test]
    fn memmap_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.dat");
        let elements: Vec<u16> = (0..24).collect();
        let mut file = File::create(&path).unwrap();
        file.write_all(bytemuck::cast_slice(&elements)).unwrap();
        drop(file);

        let descriptor = MemmapArrayDescriptor {
            path,
            offset: 0,
            shape: vec![6, 4],
            data_type: DataType::UInt16,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        let reconstructed: MemmapArrayDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(reconstructed, descriptor);

        let mut source = MemmapArraySource::<u16>::open(reconstructed).unwrap();
        assert_eq!(source.full_shape(), vec![6, 4]);
        let selection = ArraySubset::new_with_start_shape(vec![4, 1], vec![2, 3]).unwrap();
        let window = source.fetch_window(&selection).unwrap();
        assert_eq!(window.shape(), &[2, 3]);
        assert_eq!(window[[0, 0]], 17);
        assert_eq!(window[[1, 2]], 23);
    }

    #[test]
    fn memmap_source_data_type_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.dat");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let descriptor = MemmapArrayDescriptor {
            path,
            offset: 0,
            shape: vec![8],
            data_type: DataType::UInt16,
        };
        assert!(matches!(
            MemmapArraySource::<f32>::open(descriptor),
            Err(SourceError::DataTypeMismatch(..))
        ));
    }

    #[test]
    fn memmap_source_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.dat");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let descriptor = MemmapArrayDescriptor {
            path,
            offset: 0,
            shape: vec![100],
            data_type: DataType::UInt16,
        };
        assert!(matches!(
            MemmapArraySource::<u16>::open(descriptor),
            Err(SourceError::Io(_))
        ));
    }
}
