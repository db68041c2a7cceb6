//! Raw block device access.
//!
//! Provides read-only positional access using O_DIRECT for bypassing the
//! page cache. Unaligned requests are served through an aligned bounce
//! buffer.

use crate::config::DIRECT_IO_ALIGNMENT;
use crate::error::{Error, Result};
use crate::storage::{AlignedBuf, BackingStore};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Handle for raw block device access.
pub struct BlockDevice {
    file: File,
    path: PathBuf,
    /// Whether the file was opened with O_DIRECT.
    direct: bool,
}

impl BlockDevice {
    /// Open a device or image for unbuffered reading.
    ///
    /// Falls back to buffered reads on file systems that reject O_DIRECT.
    pub fn open(path: &Path) -> Result<Self> {
        match Self::open_with(path, true) {
            Err(Error::Io(e)) if e.raw_os_error() == Some(libc::EINVAL) => {
                warn!(
                    "{} does not support O_DIRECT, using buffered reads",
                    path.display()
                );
                Self::open_with(path, false)
            }
            other => other,
        }
    }

    /// Open a device or image through the page cache.
    pub fn open_buffered(path: &Path) -> Result<Self> {
        Self::open_with(path, false)
    }

    fn open_with(path: &Path, direct: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if direct {
                options.custom_flags(libc::O_DIRECT);
            }
        }
        let direct = direct && cfg!(target_os = "linux");

        let file = options.open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                Error::PermissionDenied(format!(
                    "Cannot open block device {}. Try running with sudo.",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        debug!("opened {} (direct: {})", path.display(), direct);
        Ok(Self {
            file,
            path: path.to_path_buf(),
            direct,
        })
    }

    /// Path this device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether reads bypass the page cache.
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Fill an aligned buffer, stopping at the first short read since a
    /// follow-up read would start at an unaligned offset.
    fn read_direct(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled % DIRECT_IO_ALIGNMENT != 0 {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn is_aligned(buf: &[u8], offset: u64) -> bool {
        let align = DIRECT_IO_ALIGNMENT;
        offset % align as u64 == 0 && buf.len() % align == 0 && buf.as_ptr() as usize % align == 0
    }
}

impl BackingStore for BlockDevice {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if !self.direct || Self::is_aligned(buf, offset) {
            return self.file.read_at(buf, offset);
        }

        // Calculate aligned read bounds
        let align = DIRECT_IO_ALIGNMENT as u64;
        let aligned_start = (offset / align) * align;
        let aligned_end = (offset + buf.len() as u64).div_ceil(align) * align;
        let aligned_len = (aligned_end - aligned_start) as usize;

        let mut bounce = AlignedBuf::with_len(aligned_len, DIRECT_IO_ALIGNMENT);
        let n = self.read_direct(&mut bounce, aligned_start)?;

        // Extract the requested portion
        let skip = (offset - aligned_start) as usize;
        if n <= skip {
            return Ok(0);
        }
        let len = buf.len().min(n - skip);
        buf[..len].copy_from_slice(&bounce[skip..skip + len]);
        Ok(len)
    }

    fn size(&self) -> io::Result<u64> {
        self.file.size()
    }
}
