//! Raw device access
//!
//! Read-only handle to a block device or image file. Reads are positioned
//! (`pread`), so the file cursor is never shared state between callers.

use ldmcompat_common::{Error, Result, SECTOR_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Anything sectors can be read from
pub trait BlockSource: Send + Sync {
    /// Read into `buf` starting at byte `offset`.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()`
    /// only when the end of the source was reached.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Size of the source in bytes
    fn size(&self) -> u64;
}

/// Raw device handle
#[derive(Debug)]
pub struct RawDevice {
    file: File,
    path: String,
    size: u64,
}

impl RawDevice {
    /// Open a device or image file read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("failed to open {}: {}", path_str, e)))?;

        Self::from_file(file, path_str)
    }

    /// Wrap a handle that is already open.
    ///
    /// The file position is irrelevant; every read is positioned.
    pub fn from_file(file: File, path: impl Into<String>) -> Result<Self> {
        let path = path.into();

        let metadata = file
            .metadata()
            .map_err(|e| Error::Storage(format!("failed to get metadata for {}: {}", path, e)))?;

        let size = if Self::is_block_device(&metadata) {
            Self::get_block_device_size(&file, &path)?
        } else {
            metadata.len()
        };

        Ok(Self { file, path, size })
    }

    /// Check if the handle refers to a block device
    fn is_block_device(metadata: &std::fs::Metadata) -> bool {
        use std::os::unix::fs::FileTypeExt;
        metadata.file_type().is_block_device()
    }

    /// Get block device size using ioctl
    #[cfg(target_os = "linux")]
    fn get_block_device_size(file: &File, path: &str) -> Result<u64> {
        use std::os::unix::io::AsRawFd;

        // BLKGETSIZE64 ioctl
        const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

        let mut size: u64 = 0;
        // SAFETY: BLKGETSIZE64 writes one u64 through the pointer
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };

        if ret == -1 {
            return Err(Error::Storage(format!(
                "failed to get block device size for {}: {}",
                path,
                io::Error::last_os_error()
            )));
        }

        Ok(size)
    }

    /// Get block device size (non-Linux fallback)
    #[cfg(not(target_os = "linux"))]
    fn get_block_device_size(file: &File, path: &str) -> Result<u64> {
        use std::io::{Seek, SeekFrom};
        let mut f = file;
        f.seek(SeekFrom::End(0))
            .map_err(|e| Error::Storage(format!("failed to get device size for {}: {}", path, e)))
    }

    /// Get the device size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the number of whole sectors on the device
    pub fn sector_count(&self) -> u64 {
        self.size / SECTOR_SIZE as u64
    }

    /// Get the device path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read data at the given offset, retrying partial reads until the
    /// buffer is full or end of file is reached
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            match self.file.read_at(&mut buf[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }
}

impl BlockSource for RawDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Self::read_at(self, offset, buf)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// In-memory image
impl BlockSource for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}
