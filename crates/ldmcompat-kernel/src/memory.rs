//! Tracking allocator
//!
//! Every block handed out carries a hidden header in front of the usable
//! region recording the requested size, so a free can update the counters
//! without the caller passing the size back in.
//!
//! Layout of one block:
//!
//! ```text
//! +----------------+--------------------------+
//! | size (usize)   | usable region (size)     |
//! | HEADER_SIZE    |                          |
//! +----------------+--------------------------+
//! ^ system block   ^ pointer given to caller
//! ```

use ldmcompat_common::{Error, Result};
use serde::Serialize;
use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{trace, warn};

/// Bytes reserved in front of the usable region
const HEADER_SIZE: usize = 16;

/// Alignment of the system block, and therefore of the usable region
const HEADER_ALIGN: usize = 16;

/// Allocator counters.
///
/// Only the owning [`TrackingAllocator`] moves them; everyone else reads a
/// [`MemSnapshot`].
///
/// ```compile_fail
/// use ldmcompat_kernel::TrackingAllocator;
///
/// let alloc = TrackingAllocator::new();
/// alloc.stats().count.store(0, std::sync::atomic::Ordering::Relaxed);
/// ```
#[derive(Debug)]
pub struct MemStats {
    /// Number of allocations performed
    allocs: AtomicU64,
    /// Number of frees performed
    frees: AtomicU64,
    /// Bytes currently allocated
    size: AtomicUsize,
    /// Highest value `size` has reached
    max_size: AtomicUsize,
    /// Blocks currently allocated
    count: AtomicUsize,
    /// Highest value `count` has reached
    max_count: AtomicUsize,
}

impl MemStats {
    pub const fn new() -> Self {
        Self {
            allocs: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            size: AtomicUsize::new(0),
            max_size: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            max_count: AtomicUsize::new(0),
        }
    }

    fn record_alloc(&self, size: usize) {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        let live_size = self.size.fetch_add(size, Ordering::Relaxed) + size;
        self.max_size.fetch_max(live_size, Ordering::Relaxed);
        let live_count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_count.fetch_max(live_count, Ordering::Relaxed);
    }

    fn record_free(&self, size: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.count.fetch_sub(1, Ordering::Relaxed);
        self.size.fetch_sub(size, Ordering::Relaxed);
    }

    /// Copy the counters out
    pub fn snapshot(&self) -> MemSnapshot {
        MemSnapshot {
            allocs: self.allocs.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
            max_size: self.max_size.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
            max_count: self.max_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`MemStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemSnapshot {
    pub allocs: u64,
    pub frees: u64,
    pub size: usize,
    pub max_size: usize,
    pub count: usize,
    pub max_count: usize,
}

impl MemSnapshot {
    /// True if blocks are still outstanding
    #[must_use]
    pub const fn has_leaks(&self) -> bool {
        self.count != 0 || self.size != 0
    }
}

/// Header-based allocator that keeps [`MemStats`] up to date
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    stats: MemStats,
}

impl TrackingAllocator {
    pub const fn new() -> Self {
        Self {
            stats: MemStats::new(),
        }
    }

    /// Get a copy of the counters
    pub fn snapshot(&self) -> MemSnapshot {
        self.stats.snapshot()
    }

    fn layout_for(size: usize) -> Option<Layout> {
        let total = size.checked_add(HEADER_SIZE)?;
        Layout::from_size_align(total, HEADER_ALIGN).ok()
    }

    /// Allocate `size` usable bytes.
    ///
    /// The returned pointer is aligned to 16 bytes and is never null. The
    /// contents are uninitialized. `tag` names the call site in trace output.
    pub fn allocate(&self, size: usize, tag: &'static str) -> Result<NonNull<u8>> {
        let Some(layout) = Self::layout_for(size) else {
            warn!(size, tag, "allocation size overflows layout");
            return Err(Error::OutOfMemory { size });
        };

        // SAFETY: layout is never zero-sized, the header is always present
        let base = unsafe { alloc::alloc(layout) };
        let Some(base) = NonNull::new(base) else {
            warn!(size, tag, "system allocator returned null");
            return Err(Error::OutOfMemory { size });
        };

        // SAFETY: base is HEADER_ALIGN aligned and at least HEADER_SIZE long
        let ptr = unsafe {
            base.as_ptr().cast::<usize>().write(size);
            base.add(HEADER_SIZE)
        };

        self.stats.record_alloc(size);
        trace!(ptr = ?ptr, size, tag, "kmalloc");
        Ok(ptr)
    }

    /// Release a block. `None` is accepted and ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this
    /// same allocator and must not have been released already.
    pub unsafe fn release(&self, ptr: Option<NonNull<u8>>, tag: &'static str) {
        let Some(ptr) = ptr else {
            return;
        };

        // SAFETY: caller guarantees ptr came from allocate, which placed the
        // header HEADER_SIZE bytes in front of it
        unsafe {
            let base = ptr.sub(HEADER_SIZE);
            let size = base.as_ptr().cast::<usize>().read();
            self.stats.record_free(size);
            trace!(ptr = ?ptr, size, tag, "kfree");
            let layout = Layout::from_size_align_unchecked(size + HEADER_SIZE, HEADER_ALIGN);
            alloc::dealloc(base.as_ptr(), layout);
        }
    }

    /// Allocate a zero-filled buffer that releases itself on drop
    pub fn alloc_buf(&self, size: usize, tag: &'static str) -> Result<TrackedBuf<'_>> {
        let ptr = self.allocate(size, tag)?;
        // SAFETY: allocate returned at least `size` writable bytes
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(TrackedBuf {
            alloc: self,
            ptr,
            len: size,
            tag,
        })
    }
}

/// Owned byte block from a [`TrackingAllocator`]
pub struct TrackedBuf<'a> {
    alloc: &'a TrackingAllocator,
    ptr: NonNull<u8>,
    len: usize,
    tag: &'static str,
}

// SAFETY: the block is uniquely owned and only reachable through &/&mut self
unsafe impl Send for TrackedBuf<'_> {}
// SAFETY: shared access only hands out &[u8]
unsafe impl Sync for TrackedBuf<'_> {}

impl TrackedBuf<'_> {
    /// Call site this buffer was allocated for
    pub fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Deref for TrackedBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid and initialized for len bytes while self lives
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for TrackedBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for TrackedBuf<'_> {
    fn drop(&mut self) {
        // SAFETY: ptr came from self.alloc.allocate and is released only here
        unsafe { self.alloc.release(Some(self.ptr), self.tag) };
    }
}

impl std::fmt::Debug for TrackedBuf<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedBuf")
            .field("len", &self.len)
            .field("tag", &self.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_allocate_and_release() {
        let alloc = TrackingAllocator::new();

        let ptr = alloc.allocate(100, "test").unwrap();
        assert_eq!(ptr.as_ptr() as usize % HEADER_ALIGN, 0);

        let stats = alloc.snapshot();
        assert_eq!(stats.allocs, 1);
        assert_eq!(stats.size, 100);
        assert_eq!(stats.count, 1);

        unsafe { alloc.release(Some(ptr), "test") };

        let stats = alloc.snapshot();
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.max_size, 100);
        assert_eq!(stats.max_count, 1);
        assert!(!stats.has_leaks());
    }

    #[test]
    fn test_release_none_is_noop() {
        let alloc = TrackingAllocator::new();
        let _keep = alloc.alloc_buf(8, "test").unwrap();
        let before = alloc.snapshot();

        unsafe { alloc.release(None, "test") };

        assert_eq!(alloc.snapshot(), before);
    }

    #[test]
    fn test_zero_size_allocation() {
        let alloc = TrackingAllocator::new();
        let buf = alloc.alloc_buf(0, "test").unwrap();
        assert!(buf.is_empty());
        assert_eq!(alloc.snapshot().count, 1);
        drop(buf);
        assert_eq!(alloc.snapshot().count, 0);
    }

    #[test]
    fn test_oversized_allocation_fails() {
        let alloc = TrackingAllocator::new();

        let err = alloc.allocate(usize::MAX, "test").unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { size: usize::MAX }));

        let err = alloc.allocate(isize::MAX as usize, "test").unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { .. }));

        assert_eq!(alloc.snapshot(), MemSnapshot::default());
    }

    #[test]
    fn test_tracked_buf_is_zeroed_and_writable() {
        let alloc = TrackingAllocator::new();
        let mut buf = alloc.alloc_buf(64, "test").unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        buf[..5].copy_from_slice(b"hello");
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(buf.tag(), "test");

        drop(buf);
        assert!(!alloc.snapshot().has_leaks());
    }

    #[test]
    fn test_high_water_marks() {
        let alloc = TrackingAllocator::new();

        let a = alloc.alloc_buf(100, "a").unwrap();
        let b = alloc.alloc_buf(200, "b").unwrap();
        drop(a);
        let c = alloc.alloc_buf(50, "c").unwrap();

        let stats = alloc.snapshot();
        assert_eq!(stats.size, 250);
        assert_eq!(stats.max_size, 300);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max_count, 2);

        drop(b);
        drop(c);
        let stats = alloc.snapshot();
        assert_eq!(stats.allocs, 3);
        assert_eq!(stats.frees, 3);
        assert_eq!(stats.max_size, 300);
    }

    #[test]
    fn test_random_paired_sequence() {
        let alloc = TrackingAllocator::new();
        let mut rng = StdRng::seed_from_u64(0x1d_a7a);
        let mut live = Vec::new();
        let mut observed_size = 0usize;
        let mut observed_count = 0usize;
        let mut last_max_size = 0usize;

        for _ in 0..500 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let size = rng.gen_range(0..2048);
                live.push(alloc.alloc_buf(size, "random").unwrap());
            } else {
                let idx = rng.gen_range(0..live.len());
                live.swap_remove(idx);
            }

            let stats = alloc.snapshot();
            let expected: usize = live.iter().map(|b| b.len()).sum();
            assert_eq!(stats.size, expected);
            assert_eq!(stats.count, live.len());

            observed_size = observed_size.max(expected);
            observed_count = observed_count.max(live.len());
            assert_eq!(stats.max_size, observed_size);
            assert_eq!(stats.max_count, observed_count);
            assert!(stats.max_size >= last_max_size);
            last_max_size = stats.max_size;
        }

        live.clear();
        let stats = alloc.snapshot();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.allocs, stats.frees);
    }

    #[test]
    fn test_counters_follow_allocator_only() {
        let alloc = TrackingAllocator::new();
        let buf = alloc.alloc_buf(64, "test").unwrap();

        // A copy taken by a caller has no path back into the counters
        let mut copy = alloc.snapshot();
        copy.count = 0;
        copy.max_size = 0;
        drop(buf);

        let stats = alloc.snapshot();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.max_size, 64);
        assert_eq!(stats.max_count, 1);
        assert_eq!(stats.allocs, stats.frees);
    }
}
