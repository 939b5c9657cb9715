//! Core types for ldmcompat

use serde::{Deserialize, Serialize};

/// Size of one addressable device sector in bytes
pub const SECTOR_SIZE: usize = 512;

/// Size of an emulated kernel page, also the capacity of `pp_buf`
pub const PAGE_SIZE: usize = 4096;

/// Capacity of the buffer a single log call is rendered into
pub const LOG_LINE_SIZE: usize = 1024;

/// Default number of partition slots a decoder may fill
pub const DEFAULT_PARTITION_LIMIT: usize = 256;

/// One recorded partition, in sectors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// First sector
    pub from: u64,
    /// Length in sectors
    pub size: u64,
}

impl Partition {
    pub const fn new(from: u64, size: u64) -> Self {
        Self { from, size }
    }

    /// A slot nobody has written to
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}
