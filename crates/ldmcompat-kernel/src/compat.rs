//! Kernel-named entry points
//!
//! Decoder code ported from the kernel calls these the way it called
//! `kmalloc`, `read_dev_sector` and friends. They run against the
//! process-wide allocator, device and log, and report failure as `None`.

use crate::device::require_device;
use crate::memory::{MemSnapshot, TrackingAllocator};
use crate::partition::{BlockDevice, ParsedPartitions};
use crate::printk::klog;
use crate::sector::{Sector, SectorReader};
use std::ptr::NonNull;
use tracing::debug;

/// Allocator behind `kmalloc` and every sector read
pub static KMALLOC: TrackingAllocator = TrackingAllocator::new();

/// A sector held by a decoder; `None` when released or never read
pub type SectorSlot = Option<Sector<'static>>;

pub fn kmalloc(size: usize, tag: &'static str) -> Option<NonNull<u8>> {
    KMALLOC.allocate(size, tag).ok()
}

/// # Safety
///
/// `ptr` must come from [`kmalloc`] and must not be freed twice.
pub unsafe fn kfree(ptr: Option<NonNull<u8>>, tag: &'static str) {
    // SAFETY: forwarded to the caller
    unsafe { KMALLOC.release(ptr, tag) };
}

/// Counters of the process-wide allocator
pub fn mem_stats() -> MemSnapshot {
    KMALLOC.snapshot()
}

/// Turn printk suppression off (`true`) or on
pub fn set_debug(debug: bool) {
    klog().set_debug(debug);
}

/// Read sector `n` of the installed device into `sect`.
///
/// Fails when `bdev` is `None`, no device is installed, or the read fails.
/// On failure `sect` is left as it was.
pub fn read_dev_sector<'s>(
    bdev: Option<&BlockDevice>,
    n: u64,
    sect: &'s mut SectorSlot,
) -> Option<&'s [u8]> {
    let bdev = bdev?;
    let read = require_device().and_then(|dev| {
        SectorReader::new(dev.as_ref(), &KMALLOC, klog()).read_sector(n)
    });
    match read {
        Ok(sector) => Some(sect.insert(sector).data()),
        Err(e) => {
            debug!(bdev = bdev.name(), sector = n, error = %e, "read_dev_sector failed");
            None
        }
    }
}

/// Release the sector in `sect`, leaving it empty
pub fn put_dev_sector(sect: &mut SectorSlot) {
    drop(sect.take());
}

/// [`read_dev_sector`] limited to the scan window of `state`
pub fn read_part_sector<'s>(
    state: &ParsedPartitions,
    n: u64,
    sect: &'s mut SectorSlot,
) -> Option<&'s [u8]> {
    if n >= state.scan_limit() {
        return None;
    }
    read_dev_sector(Some(state.bdev()), n, sect)
}

/// Record partition `n` in `state`; ignored past the partition limit
pub fn put_partition(state: &mut ParsedPartitions, n: usize, from: u64, size: u64) {
    state.put_partition(n, from, size);
}
