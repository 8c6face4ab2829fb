//! Lazy data sources.
//!
//! A [`LazySource`] represents a potentially-huge array that is never
//! materialized in full: it knows its shape and element type, and can return
//! an arbitrary contiguous hyper-rectangular window of its data on demand.
//! Sources are wrapped by a [`BufferIterator`](crate::iterator::BufferIterator)
//! for the duration of one write operation.
//!
//! Three source families are provided:
//!  - [`imaging`]: lazy imaging extractors with frame-range reads and a
//!    row/column axis convention correction,
//!  - [`video`]: forward-only sequential video decoders,
//!  - [`sliceable`]: randomly-sliceable arrays, including memory-mapped files
//!    reconstructible across process boundaries.

pub mod imaging;
pub mod sliceable;
pub mod video;

pub use imaging::{ImagingExtractor, ImagingSource};
pub use sliceable::{MemmapArrayDescriptor, MemmapArraySource};
pub use video::{FrameReader, VideoSource};

use ndarray::ArrayD;
use thiserror::Error;

use crate::{
    array::{ArrayShape, Element},
    array_subset::ArraySubset,
};

/// A lazy data source.
///
/// The minimal contract a data source must satisfy to be streamed: a shape,
/// an element type, and a window fetch. Implementations own any underlying
/// file or decoder handle and release it on drop.
pub trait LazySource {
    /// The element type of the source.
    type Elem: Element;

    /// Return the shape of the full logical array.
    fn full_shape(&self) -> ArrayShape;

    /// Fetch the window of data identified by `selection`.
    ///
    /// The returned array must have exactly the shape of `selection`; the
    /// caller treats any other shape as fatal.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the selection is invalid for this source
    /// or the underlying read fails.
    fn fetch_window(&mut self, selection: &ArraySubset) -> Result<ArrayD<Self::Elem>, SourceError>;
}

/// A forward-only source was asked for data at or beyond its end.
#[derive(Copy, Clone, Debug, Error)]
#[error("requested data up to index {requested} but the source ends at {end}")]
pub struct SourceExhaustedError {
    /// The requested end index (exclusive).
    pub requested: u64,
    /// The end of the source (exclusive).
    pub end: u64,
}

/// A lazy source fetch error.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A forward-only source was asked for data past its end.
    #[error(transparent)]
    Exhausted(#[from] SourceExhaustedError),
    /// A forward-only source was asked to seek backwards.
    #[error("requested a window starting at {requested} behind the reader cursor at {cursor}")]
    NonMonotonicRead {
        /// The requested start index.
        requested: u64,
        /// The reader cursor.
        cursor: u64,
    },
    /// A selection outside the bounds of the source.
    #[error("selection {_0} is out of bounds of source shape {_1:?}")]
    InvalidSelection(ArraySubset, ArrayShape),
    /// A descriptor data type not matching the element type of the source.
    #[error("descriptor data type {_0} does not match element type {_1}")]
    DataTypeMismatch(crate::array::DataType, crate::array::DataType),
    /// An I/O error from the underlying file or mapping.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A failure in an external decoder.
    #[error("decoder error: {_0}")]
    Decoder(String),
}
