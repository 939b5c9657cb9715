//! Error types for ldmcompat
//!
//! This module defines the common error type used by the allocator,
//! the device layer and the sector reader.

use thiserror::Error;

/// Common result type for ldmcompat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ldmcompat
#[derive(Debug, Error)]
pub enum Error {
    // Allocator errors
    #[error("out of memory: failed to allocate {size} bytes")]
    OutOfMemory { size: usize },

    // Device errors
    #[error("device I/O error at offset {offset}: {source}")]
    DeviceIo {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("no device installed")]
    NoDevice,

    #[error("storage error: {0}")]
    Storage(String),

    // Scan window errors
    #[error("index {index} exceeds limit {limit}")]
    BoundsExceeded { index: u64, limit: u64 },

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error came from the device
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceIo { .. } | Self::ShortRead { .. } | Self::NoDevice
        )
    }

    /// Check if this is a scan window violation
    #[must_use]
    pub const fn is_bounds(&self) -> bool {
        matches!(self, Self::BoundsExceeded { .. })
    }
}
