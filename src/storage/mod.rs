//! Backing storage for LUKS containers.
//!
//! This module handles:
//! - Positional reads from files, raw devices and in-memory images
//! - Unbuffered (O_DIRECT) block device access
//! - Aligned scratch buffers for unbuffered reads

mod aligned;
mod block_device;

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Seek, SeekFrom};

pub use aligned::AlignedBuf;
pub use block_device::BlockDevice;

/// Read-only positional access to a container.
///
/// Implementations must allow concurrent `read_at` calls through `&self`.
pub trait BackingStore {
    /// Read up to `buf.len()` bytes at `offset`. Returns `Ok(0)` at the end
    /// of the store.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Total size of the store in bytes.
    fn size(&self) -> io::Result<u64>;
}

impl BackingStore for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            std::os::unix::fs::FileExt::read_at(self, buf, offset)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::FileExt::seek_read(self, buf, offset)
        }
    }

    fn size(&self) -> io::Result<u64> {
        // Block devices report a zero length in their metadata.
        let mut file = self;
        file.seek(SeekFrom::End(0))
    }
}

impl BackingStore for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = match usize::try_from(offset) {
            Ok(start) if start < self.len() => start,
            _ => return Ok(0),
        };
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl BackingStore for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<T: BackingStore + ?Sized> BackingStore for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

/// Fill as much of `buf` as the store holds at `offset`.
///
/// Returns fewer than `buf.len()` bytes only at the end of the store.
pub fn read_full_at<S: BackingStore + ?Sized>(store: &S, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let at = offset.checked_add(filled as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "read offset overflows")
        })?;
        match store.read_at(&mut buf[filled..], at) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes of header structure `what`.
///
/// A short read means the container is truncated and is reported as a
/// format error.
pub(crate) fn read_exact_at<S: BackingStore + ?Sized>(
    store: &S,
    buf: &mut [u8],
    offset: u64,
    what: &'static str,
) -> Result<()> {
    let n = read_full_at(store, buf, offset).map_err(|source| Error::Read {
        what,
        offset,
        source,
    })?;
    if n < buf.len() {
        return Err(Error::Format(format!(
            "truncated {}: expected {} bytes at offset {}, found {}",
            what,
            buf.len(),
            offset,
            n
        )));
    }
    Ok(())
}
