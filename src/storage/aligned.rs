//! Memory-aligned byte buffers for unbuffered I/O.

use std::ops::{Deref, DerefMut};
use zeroize::Zeroize;

/// A growable buffer whose visible slice starts at an aligned address.
///
/// Contents are wiped when the buffer grows, when [`AlignedBuf::wipe`] is
/// called and on drop.
pub struct AlignedBuf {
    storage: Vec<u8>,
    start: usize,
    len: usize,
    align: usize,
}

impl AlignedBuf {
    /// Create an empty buffer aligned to `align` bytes (a power of two).
    pub fn new(align: usize) -> Self {
        Self {
            storage: Vec::new(),
            start: 0,
            len: 0,
            align: align.max(1),
        }
    }

    /// Create a zeroed buffer of `len` bytes.
    pub fn with_len(len: usize, align: usize) -> Self {
        let mut buf = Self::new(align);
        buf.resize(len);
        buf
    }

    /// Alignment of the visible slice.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Make the visible slice `len` bytes long, reallocating if needed.
    ///
    /// Existing contents are not preserved across a reallocation.
    pub fn resize(&mut self, len: usize) {
        if self.start + len > self.storage.len() {
            self.storage.zeroize();
            self.storage = vec![0u8; len + self.align];
            self.start = match self.storage.as_ptr().align_offset(self.align) {
                offset if offset < self.align => offset,
                _ => 0,
            };
        }
        self.len = len;
    }

    /// Zero the whole allocation.
    pub fn wipe(&mut self) {
        self.storage.zeroize();
        self.start = 0;
        self.len = 0;
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.storage[self.start..self.start + self.len]
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.start..self.start + self.len]
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        self.storage.zeroize();
    }
}
