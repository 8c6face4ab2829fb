//! A rust library for streaming larger-than-memory arrays into chunked, compressed storage backends.
//!
//! `chunkstream` separates *what* gets written from *how* it gets written:
//! a [`source::LazySource`] exposes a huge logical array without materializing
//! it, a [`iterator::BufferIterator`] slices it into memory-bounded buffer
//! windows aligned to the on-disk chunk grid, and a
//! [`backend::BackendConfiguration`] describes the chunking and compression of
//! every dataset in the output container. Configurations are plain data: they
//! serialize to JSON, can be diffed and edited, and are validated in full
//! before any I/O occurs.
//!
//! ## Getting Started
//! - [`chunking`] estimates chunk and buffer shapes from byte budgets.
//! - [`iterator::BufferIteratorBuilder`] assembles an iterator over a source.
//! - [`backend::BackendConfiguration::default_for`] builds a container-wide
//!   default configuration, and [`write`] applies it and streams the data.
//!
//! ## Example
//! ```rust
//! use chunkstream::array_subset::ArraySubset;
//! use chunkstream::iterator::BufferIteratorBuilder;
//!
//! let array = ndarray::ArrayD::<i16>::zeros(ndarray::IxDyn(&[1000, 4]));
//! let mut iterator = BufferIteratorBuilder::new().build(array)?;
//! let (window, data) = iterator.next().unwrap()?;
//! assert_eq!(window, ArraySubset::new_with_shape(vec![1000, 4]));
//! assert_eq!(data.shape(), &[1000, 4]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Licence
//! `chunkstream` is licensed under either of
//!  - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod array;
pub mod array_subset;
pub mod backend;
pub mod chunking;
pub mod config;
pub mod dataset;
pub mod iterator;
pub mod source;
pub mod write;
