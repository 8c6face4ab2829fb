//! Global configuration options.
//!
//! Retrieve the global [`Config`] with [`global_config`] and modify it with
//! [`global_config_mut`].
//!
//! # Configuration Options
//!
//! ## Chunk Target Megabytes
//! > default: `10.0`
//!
//! The default byte budget, in megabytes, for one on-disk chunk when a chunk
//! shape is estimated rather than supplied explicitly. Chunks around 10 MB
//! compress and page well on both supported backends.
//!
//! ## Buffer Target Gigabytes
//! > default: `1.0`
//!
//! The default byte budget, in gigabytes, for one in-memory buffer window
//! pulled from a lazy source per iteration.
//!
//! ## Chunk Concurrent Minimum
//! > default: `4`
//!
//! For concurrent chunk writes, the preferred minimum number of chunks in
//! flight. The effective concurrency is the larger of this and the configured
//! worker count.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options.
#[derive(Debug)]
pub struct Config {
    chunk_target_mb: f64,
    buffer_target_gb: f64,
    chunk_concurrent_minimum: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_target_mb: 10.0,
            buffer_target_gb: 1.0,
            chunk_concurrent_minimum: 4,
        }
    }
}

impl Config {
    /// Get the [chunk target megabytes](#chunk-target-megabytes) configuration.
    #[must_use]
    pub fn chunk_target_mb(&self) -> f64 {
        self.chunk_target_mb
    }

    /// Set the [chunk target megabytes](#chunk-target-megabytes) configuration.
    pub fn set_chunk_target_mb(&mut self, chunk_target_mb: f64) {
        self.chunk_target_mb = chunk_target_mb;
    }

    /// Get the [buffer target gigabytes](#buffer-target-gigabytes) configuration.
    #[must_use]
    pub fn buffer_target_gb(&self) -> f64 {
        self.buffer_target_gb
    }

    /// Set the [buffer target gigabytes](#buffer-target-gigabytes) configuration.
    pub fn set_buffer_target_gb(&mut self, buffer_target_gb: f64) {
        self.buffer_target_gb = buffer_target_gb;
    }

    /// Get the [chunk concurrent minimum](#chunk-concurrent-minimum) configuration.
    #[must_use]
    pub fn chunk_concurrent_minimum(&self) -> usize {
        self.chunk_concurrent_minimum
    }

    /// Set the [chunk concurrent minimum](#chunk-concurrent-minimum) configuration.
    pub fn set_chunk_concurrent_minimum(&mut self, concurrent_minimum: usize) {
        self.chunk_concurrent_minimum = concurrent_minimum;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might
/// panic if the global config is already held mutably by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might
/// panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_chunk_target() {
        assert!((global_config().chunk_target_mb() - 10.0).abs() < f64::EPSILON);
        global_config_mut().set_chunk_target_mb(5.0);
        assert!((global_config().chunk_target_mb() - 5.0).abs() < f64::EPSILON);
        global_config_mut().set_chunk_target_mb(10.0);
    }
}
