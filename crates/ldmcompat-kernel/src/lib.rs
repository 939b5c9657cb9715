//! ldmcompat Kernel - userspace stand-ins for kernel block I/O
//!
//! Partition decoders written against the kernel's block layer expect
//! `read_dev_sector`, `kmalloc` and `printk`. This crate provides them on
//! top of an already-open device or image file:
//! - Tracking allocator with per-block size headers and usage counters
//! - Positioned sector reads from the process-wide device
//! - Partition table state with a fixed number of slots
//! - `printk` with kernel priority-tag filtering
//! - Big-endian loads, C string helpers and a sentinel linked list

pub mod compat;
pub mod device;
pub mod list;
pub mod memory;
pub mod partition;
pub mod printk;
pub mod raw_io;
pub mod sector;
pub mod string;
pub mod unaligned;

// Re-exports
pub use compat::{
    KMALLOC, SectorSlot, kfree, kmalloc, mem_stats, put_dev_sector, put_partition,
    read_dev_sector, read_part_sector, set_debug,
};
pub use device::{current_device, install_device, remove_device, require_device};
pub use list::{HEAD, ListHead, NodeId};
pub use memory::{MemSnapshot, MemStats, TrackedBuf, TrackingAllocator};
pub use partition::{BlockDevice, ParsedPartitions};
pub use printk::{KernelLog, LogState, MemorySink, klog};
pub use raw_io::{BlockSource, RawDevice};
pub use sector::{Sector, SectorReader};
pub use string::{hex_to_bin, strlcat};
pub use unaligned::{get_unaligned_be16, get_unaligned_be32, get_unaligned_be64};
