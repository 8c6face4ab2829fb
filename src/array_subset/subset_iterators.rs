//! Array subset iterators.
//!
//! The iterators are:
//!  - [`Indices`]: iterate over the multidimensional indices of the elements in the subset.
//!  - [`ContiguousLinearisedIndices`]: iterate over contiguous runs of elements in the subset with the start a linearised index.
//!  - [`Windows`]: iterate over regular sized windows tiling the array subset, clipped to its bounds.
//!
//! These can be created with the appropriate [`ArraySubset`](super::ArraySubset) methods including
//! [`indices`](super::ArraySubset::indices) and [`windows`](super::ArraySubset::windows).
//!
//! All iterators support [`into_iter()`](IntoIterator::into_iter) ([`IntoIterator`]).
//! The [`Indices`] and [`Windows`] iterators also support [`rayon`]'s
//! [`into_par_iter()`](rayon::iter::IntoParallelIterator::into_par_iter)
//! ([`IntoParallelIterator`](rayon::iter::IntoParallelIterator)).

mod contiguous_linearised_indices_iterator;
mod indices_iterator;
mod windows_iterator;

pub use contiguous_linearised_indices_iterator::{
    ContiguousLinearisedIndices, ContiguousLinearisedIndicesIterator,
};
pub use indices_iterator::{Indices, IndicesIterator, ParIndicesIterator};
pub use windows_iterator::{ParWindowsIterator, Windows, WindowsIterator};
