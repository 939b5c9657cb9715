//! Partition table state shared with decoders

use crate::string::{strlcat, strnlen};
use ldmcompat_common::{PAGE_SIZE, Partition};
use std::borrow::Cow;

/// Kernel-style description of the device being scanned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDevice {
    name: String,
    dev: u64,
}

impl BlockDevice {
    pub fn new(name: impl Into<String>, dev: u64) -> Self {
        Self {
            name: name.into(),
            dev,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device number
    pub fn dev(&self) -> u64 {
        self.dev
    }
}

/// Results of scanning one device
#[derive(Debug)]
pub struct ParsedPartitions {
    bdev: BlockDevice,
    parts: Vec<Partition>,
    scan_limit: u64,
    pp_buf: Vec<u8>,
}

impl ParsedPartitions {
    /// `limit` partition slots, sectors `0..scan_limit` readable
    pub fn new(bdev: BlockDevice, limit: usize, scan_limit: u64) -> Self {
        Self {
            bdev,
            parts: vec![Partition::default(); limit],
            scan_limit,
            pp_buf: vec![0; PAGE_SIZE],
        }
    }

    pub fn bdev(&self) -> &BlockDevice {
        &self.bdev
    }

    /// Number of partition slots
    pub fn limit(&self) -> usize {
        self.parts.len()
    }

    /// First sector index a decoder may not read
    pub fn scan_limit(&self) -> u64 {
        self.scan_limit
    }

    pub fn parts(&self) -> &[Partition] {
        &self.parts
    }

    /// Record partition `n`. Calls with `n >= limit()` are ignored; check
    /// the limit first if truncation matters.
    pub fn put_partition(&mut self, n: usize, from: u64, size: u64) {
        if let Some(slot) = self.parts.get_mut(n) {
            *slot = Partition::new(from, size);
        }
    }

    /// Append to the human readable partition list, returning the length
    /// the text would have had without truncation
    pub fn pp_append(&mut self, text: &str) -> usize {
        strlcat(&mut self.pp_buf, text.as_bytes())
    }

    /// Human readable partition list
    pub fn pp_buf(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.pp_buf[..strnlen(&self.pp_buf)])
    }
}
