//! Zarr compression configuration.

use serde::{Deserialize, Serialize};

use crate::chunking::ConfigurationError;

/// The shuffle mode of the blosc meta-compressor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscShuffleMode {
    /// No shuffling.
    NoShuffle,
    /// Byte-wise shuffling.
    Shuffle,
    /// Bit-wise shuffling.
    BitShuffle,
}

/// A Zarr compression method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum ZarrCompression {
    /// The blosc meta-compressor.
    Blosc {
        /// The internal compressor name, e.g. `zstd` or `lz4`.
        cname: String,
        /// The compression level, `0..=9`.
        clevel: u8,
        /// The shuffle mode.
        shuffle: BloscShuffleMode,
    },
    /// Zstandard compression.
    Zstd {
        /// The compression level.
        level: i32,
        /// Whether to append a content checksum to each frame.
        checksum: bool,
    },
    /// DEFLATE compression.
    Gzip {
        /// The compression level, `0..=9`.
        level: u8,
    },
    /// No compression.
    None,
}

impl Default for ZarrCompression {
    fn default() -> Self {
        Self::Blosc {
            cname: "zstd".to_string(),
            clevel: 5,
            shuffle: BloscShuffleMode::Shuffle,
        }
    }
}

impl ZarrCompression {
    /// The names of the supported compression methods.
    pub const NAMES: &'static [&'static str] = &["blosc", "zstd", "gzip", "none"];

    /// Create a compression method from its name with default parameters.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnsupportedCompression`] if `name` is not
    /// one of [`Self::NAMES`].
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        match name {
            "blosc" => Ok(Self::default()),
            "zstd" => Ok(Self::Zstd {
                level: 3,
                checksum: false,
            }),
            "gzip" => Ok(Self::Gzip { level: 4 }),
            "none" => Ok(Self::None),
            _ => Err(ConfigurationError::UnsupportedCompression {
                backend: "zarr",
                name: name.to_string(),
            }),
        }
    }

    /// Return the name of the compression method.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blosc { .. } => "blosc",
            Self::Zstd { .. } => "zstd",
            Self::Gzip { .. } => "gzip",
            Self::None => "none",
        }
    }
}
