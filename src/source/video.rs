//! Forward-only video sources.
//!
//! A [`FrameReader`] wraps an external video decoder that can only step
//! forwards through its stream. [`VideoSource`] adapts it to a [`LazySource`]
//! by advancing the decoder frame-by-frame to reach each requested window,
//! which is sufficient because a
//! [`BufferIterator`](crate::iterator::BufferIterator) requests windows in
//! ascending frame order.
//!
//! The decoder handle is released when the reader is dropped; [`VideoSource::close`]
//! releases it eagerly.

use ndarray::{ArrayD, Axis, Slice};

use crate::{array::ArrayShape, array_subset::ArraySubset};

use super::{LazySource, SourceError, SourceExhaustedError};

/// A forward-only sequential video decoder.
///
/// Frames share a fixed shape, conventionally `(rows, columns, components)`.
/// Implementations release the underlying decoder handle on drop, on every
/// exit path.
pub trait FrameReader {
    /// Return the total number of frames in the stream.
    fn num_frames(&self) -> u64;

    /// Return the shape of one frame.
    fn frame_shape(&self) -> ArrayShape;

    /// Decode and return the next frame, advancing the stream.
    ///
    /// Returns [`None`] at end-of-stream.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if decoding fails.
    fn read_frame(&mut self) -> Result<Option<ArrayD<u8>>, SourceError>;
}

/// A [`LazySource`] over a [`FrameReader`].
///
/// The logical shape is `(num_frames, *frame_shape)`. Windows must be
/// requested in ascending frame order; the source skips decoded frames to
/// reach a window start beyond its cursor and fails with
/// [`SourceExhaustedError`] when asked for data at or past end-of-stream.
pub struct VideoSource<R: FrameReader> {
    reader: R,
    cursor: u64,
    full_shape: ArrayShape,
}

impl<R: FrameReader> VideoSource<R> {
    /// Create a new video source.
    #[must_use]
    pub fn new(reader: R) -> Self {
        let frame_shape = reader.frame_shape();
        let mut full_shape = Vec::with_capacity(1 + frame_shape.len());
        full_shape.push(reader.num_frames());
        full_shape.extend_from_slice(&frame_shape);
        Self {
            reader,
            cursor: 0,
            full_shape,
        }
    }

    /// Return the index of the next frame the reader will decode.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Release the decoder eagerly.
    ///
    /// Dropping the source has the same effect.
    pub fn close(self) {
        drop(self);
    }

    fn next_frame(&mut self) -> Result<ArrayD<u8>, SourceError> {
        match self.reader.read_frame()? {
            Some(frame) => {
                self.cursor += 1;
                Ok(frame)
            }
            None => Err(SourceExhaustedError {
                requested: self.cursor + 1,
                end: self.cursor,
            }
            .into()),
        }
    }
}

impl<R: FrameReader> LazySource for VideoSource<R> {
    type Elem = u8;

    fn full_shape(&self) -> ArrayShape {
        self.full_shape.clone()
    }

    fn fetch_window(&mut self, selection: &ArraySubset) -> Result<ArrayD<u8>, SourceError> {
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
        if start < self.cursor {
            return Err(SourceError::NonMonotonicRead {
                requested: start,
                cursor: self.cursor,
            });
        }
        if end > self.full_shape[0] {
            return Err(SourceExhaustedError {
                requested: end,
                end: self.full_shape[0],
            }
            .into());
        }

        // Skip forwards; the decoder cannot seek.
        while self.cursor < start {
            self.next_frame()?;
        }

        let mut frames = Vec::with_capacity(usize::try_from(end - start).unwrap());
        while self.cursor < end {
            frames.push(self.next_frame()?.insert_axis(Axis(0)));
        }
        let views: Vec<_> = frames.iter().map(|frame| frame.view()).collect();
        let stacked = ndarray::concatenate(Axis(0), &views)
            .map_err(|err| SourceError::Decoder(err.to_string()))?;

        // Slice the requested sub-region of the stacked frames.
        let window = stacked.slice_each_axis(|axis| {
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
