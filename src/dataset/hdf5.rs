//! HDF5 compression and filter configuration.

use serde::{Deserialize, Serialize};

use crate::chunking::ConfigurationError;

/// An HDF5 compression method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Hdf5Compression {
    /// DEFLATE compression.
    Gzip {
        /// The compression level, `0..=9`.
        level: u8,
    },
    /// LZF compression.
    Lzf,
    /// SZIP compression.
    Szip,
    /// No compression.
    None,
}

impl Default for Hdf5Compression {
    fn default() -> Self {
        Self::Gzip { level: 4 }
    }
}

impl Hdf5Compression {
    /// The names of the supported compression methods.
    pub const NAMES: &'static [&'static str] = &["gzip", "lzf", "szip", "none"];

    /// Create a compression method from its name with default parameters.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnsupportedCompression`] if `name` is not
    /// one of [`Self::NAMES`].
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        match name {
            "gzip" => Ok(Self::default()),
            "lzf" => Ok(Self::Lzf),
            "szip" => Ok(Self::Szip),
            "none" => Ok(Self::None),
            _ => Err(ConfigurationError::UnsupportedCompression {
                backend: "hdf5",
                name: name.to_string(),
            }),
        }
    }

    /// Return the name of the compression method.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip { .. } => "gzip",
            Self::Lzf => "lzf",
            Self::Szip => "szip",
            Self::None => "none",
        }
    }
}

/// An HDF5 filter, applied to chunk data before compression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hdf5Filter {
    /// Byte shuffle, improving compressibility of multi-byte elements.
    Shuffle,
    /// Fletcher-32 checksum of each chunk.
    Fletcher32,
}

impl Hdf5Filter {
    /// The names of the supported filters.
    pub const NAMES: &'static [&'static str] = &["shuffle", "fletcher32"];

    /// Create a filter from its name.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnsupportedFilter`] if `name` is not one
    /// of [`Self::NAMES`].
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        match name {
            "shuffle" => Ok(Self::Shuffle),
            "fletcher32" => Ok(Self::Fletcher32),
            _ => Err(ConfigurationError::UnsupportedFilter {
                backend: "hdf5",
                name: name.to_string(),
            }),
        }
    }
}
