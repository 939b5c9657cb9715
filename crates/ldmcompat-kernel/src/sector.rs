//! Sector reads
//!
//! A [`Sector`] owns the bytes of one 512-byte sector, allocated through a
//! [`TrackingAllocator`]. Dropping it hands the bytes back, so a read that
//! fails part way never leaves a block outstanding.

use crate::memory::{TrackedBuf, TrackingAllocator};
use crate::partition::ParsedPartitions;
use crate::printk::KernelLog;
use crate::raw_io::BlockSource;
use ldmcompat_common::{Error, Result, SECTOR_SIZE};
use std::io::{self, ErrorKind};
use tracing::{debug, warn};

/// One sector read from a device
pub struct Sector<'a> {
    data: TrackedBuf<'a>,
    index: u64,
}

impl Sector<'_> {
    /// Sector number on the device
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Byte offset the sector was read from
    pub fn offset(&self) -> u64 {
        self.index * SECTOR_SIZE as u64
    }

    /// Sector contents, always `SECTOR_SIZE` bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Sector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sector")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Reads sectors from a [`BlockSource`]
///
/// `'d` is the borrow of the device and log, `'a` the borrow of the
/// allocator the returned sectors hold on to.
pub struct SectorReader<'d, 'a> {
    source: &'d dyn BlockSource,
    alloc: &'a TrackingAllocator,
    log: &'d KernelLog,
}

impl<'d, 'a> SectorReader<'d, 'a> {
    pub fn new(
        source: &'d dyn BlockSource,
        alloc: &'a TrackingAllocator,
        log: &'d KernelLog,
    ) -> Self {
        Self { source, alloc, log }
    }

    /// Read sector `n`.
    ///
    /// Device failures are reported on the kernel log at critical level.
    pub fn read_sector(&self, n: u64) -> Result<Sector<'a>> {
        let mut data = self.alloc.alloc_buf(SECTOR_SIZE, "read_sector")?;

        // Offsets past i64::MAX cannot be expressed as off_t
        let Some(offset) = n
            .checked_mul(SECTOR_SIZE as u64)
            .filter(|&o| i64::try_from(o).is_ok())
        else {
            let wide = u128::from(n) * SECTOR_SIZE as u128;
            self.log.log(format_args!("[CRIT] lseek to {wide} failed\n"));
            warn!(sector = n, "sector offset beyond device addressing range");
            return Err(Error::DeviceIo {
                offset: u64::try_from(wide).unwrap_or(u64::MAX),
                source: io::Error::new(ErrorKind::InvalidInput, "offset beyond seekable range"),
            });
        };

        match self.source.read_at(offset, &mut data) {
            Ok(got) if got == SECTOR_SIZE => {}
            Ok(got) => {
                self.log.log(format_args!("[CRIT] read failed\n"));
                warn!(sector = n, offset, got, "short sector read");
                return Err(Error::ShortRead {
                    offset,
                    expected: SECTOR_SIZE,
                    actual: got,
                });
            }
            Err(e) => {
                self.log.log(format_args!("[CRIT] read failed\n"));
                warn!(sector = n, offset, error = %e, "sector read failed");
                return Err(Error::DeviceIo { offset, source: e });
            }
        }

        debug!(sector = n, offset, "read sector");
        Ok(Sector { data, index: n })
    }

    /// Read sector `n` if it lies inside the scan window of `state`.
    ///
    /// Out-of-window requests fail without touching the device and without
    /// logging.
    pub fn read_partition_sector(&self, state: &ParsedPartitions, n: u64) -> Result<Sector<'a>> {
        if n >= state.scan_limit() {
            return Err(Error::BoundsExceeded {
                index: n,
                limit: state.scan_limit(),
            });
        }
        self.read_sector(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::BlockDevice;
    use crate::printk::MemorySink;
    use crate::raw_io::RawDevice;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    /// Memory image that counts reads
    struct CountingSource {
        image: Vec<u8>,
        reads: AtomicUsize,
    }

    impl CountingSource {
        fn new(sectors: usize) -> Self {
            let image = (0..sectors * SECTOR_SIZE)
                .map(|i| (i / SECTOR_SIZE) as u8 ^ (i % 256) as u8)
                .collect();
            Self {
                image,
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl BlockSource for CountingSource {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.image.read_at(offset, buf)
        }

        fn size(&self) -> u64 {
            self.image.len() as u64
        }
    }

    fn quiet_log() -> (KernelLog, MemorySink) {
        let sink = MemorySink::new();
        (KernelLog::new(sink.clone(), false), sink)
    }

    fn image_file(sectors: usize) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        for s in 0..sectors {
            let block = [s as u8; SECTOR_SIZE];
            temp.write_all(&block).unwrap();
        }
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn test_read_sector_from_file() {
        let temp = image_file(8);
        let dev = RawDevice::open(temp.path()).unwrap();
        let alloc = TrackingAllocator::new();
        let (log, sink) = quiet_log();
        let reader = SectorReader::new(&dev, &alloc, &log);

        let sector = reader.read_sector(5).unwrap();
        assert_eq!(sector.index(), 5);
        assert_eq!(sector.offset(), 5 * 512);
        assert_eq!(sector.data().len(), SECTOR_SIZE);
        assert!(sector.data().iter().all(|&b| b == 5));
        assert_eq!(alloc.snapshot().count, 1);
        assert_eq!(alloc.snapshot().size, SECTOR_SIZE);

        drop(sector);
        assert!(!alloc.snapshot().has_leaks());
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_read_matches_device_bytes() {
        let source = CountingSource::new(4);
        let alloc = TrackingAllocator::new();
        let (log, _sink) = quiet_log();
        let reader = SectorReader::new(&source, &alloc, &log);

        for n in 0..4u64 {
            let sector = reader.read_sector(n).unwrap();
            let start = n as usize * SECTOR_SIZE;
            assert_eq!(sector.data(), &source.image[start..start + SECTOR_SIZE]);
        }
        assert_eq!(source.reads.load(Ordering::Relaxed), 4);
        assert!(!alloc.snapshot().has_leaks());
    }

    #[test]
    fn test_short_read_fails_without_leak() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0xAB; SECTOR_SIZE + 100]).unwrap();
        temp.flush().unwrap();
        let dev = RawDevice::open(temp.path()).unwrap();
        let alloc = TrackingAllocator::new();
        let (log, sink) = quiet_log();
        let reader = SectorReader::new(&dev, &alloc, &log);

        let err = reader.read_sector(1).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                offset: 512,
                expected: SECTOR_SIZE,
                actual: 100
            }
        ));
        assert_eq!(sink.contents(), "[CRIT] read failed\n");

        let stats = alloc.snapshot();
        assert_eq!(stats.allocs, 1);
        assert_eq!(stats.frees, 1);
        assert!(!stats.has_leaks());
    }

    #[test]
    fn test_read_past_end_fails() {
        let source = CountingSource::new(2);
        let alloc = TrackingAllocator::new();
        let (log, _sink) = quiet_log();
        let reader = SectorReader::new(&source, &alloc, &log);

        let err = reader.read_sector(2).unwrap_err();
        assert!(matches!(err, Error::ShortRead { actual: 0, .. }));
        assert!(!alloc.snapshot().has_leaks());
    }

    #[test]
    fn test_io_error_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::open(dir.path()).unwrap();
        let dev = RawDevice::from_file(file, dir.path().to_string_lossy()).unwrap();
        let alloc = TrackingAllocator::new();
        let (log, sink) = quiet_log();
        let reader = SectorReader::new(&dev, &alloc, &log);

        let err = reader.read_sector(0).unwrap_err();
        assert!(matches!(err, Error::DeviceIo { offset: 0, .. }));
        assert!(err.is_device_error());
        assert_eq!(sink.contents(), "[CRIT] read failed\n");
        assert!(!alloc.snapshot().has_leaks());
    }

    #[test]
    fn test_unaddressable_offset_fails_before_io() {
        let source = CountingSource::new(1);
        let alloc = TrackingAllocator::new();
        let (log, sink) = quiet_log();
        let reader = SectorReader::new(&source, &alloc, &log);

        let n = u64::MAX / 256;
        let err = reader.read_sector(n).unwrap_err();
        assert!(matches!(err, Error::DeviceIo { .. }));
        assert_eq!(
            sink.contents(),
            format!("[CRIT] lseek to {} failed\n", u128::from(n) * 512)
        );
        assert_eq!(source.reads.load(Ordering::Relaxed), 0);
        assert!(!alloc.snapshot().has_leaks());
    }

    #[test]
    fn test_large_offset_uses_64_bit_math() {
        // 2^23 sectors is 4 GiB, past any 32-bit offset
        let source = CountingSource::new(1);
        let alloc = TrackingAllocator::new();
        let (log, sink) = quiet_log();
        let reader = SectorReader::new(&source, &alloc, &log);

        let err = reader.read_sector(1 << 23).unwrap_err();
        assert!(matches!(err, Error::ShortRead { offset: 0x1_0000_0000, .. }));
        assert_eq!(sink.contents(), "[CRIT] read failed\n");
    }

    #[test]
    fn test_partition_sector_bounds() {
        let source = CountingSource::new(16);
        let alloc = TrackingAllocator::new();
        let (log, sink) = quiet_log();
        let reader = SectorReader::new(&source, &alloc, &log);
        let state = ParsedPartitions::new(BlockDevice::new("img", 0), 4, 8);

        for n in [8u64, 9, 15, u64::MAX] {
            let err = reader.read_partition_sector(&state, n).unwrap_err();
            assert!(matches!(err, Error::BoundsExceeded { limit: 8, .. }));
        }
        assert_eq!(source.reads.load(Ordering::Relaxed), 0);
        assert_eq!(sink.contents(), "");
        assert_eq!(alloc.snapshot().allocs, 0);

        let via_state = reader.read_partition_sector(&state, 7).unwrap();
        let direct = reader.read_sector(7).unwrap();
        assert_eq!(via_state.data(), direct.data());
    }
}
