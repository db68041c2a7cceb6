//! Decrypting reads from an unsealed volume.

use crate::config::ReaderConfig;
use crate::crypto::SectorCipher;
use crate::error::{Error, Result};
use crate::storage::{read_full_at, AlignedBuf, BackingStore, BlockDevice};
use crate::volume::Volume;
use log::debug;
use std::path::Path;

/// Reads plaintext from a volume's payload.
///
/// Offsets are relative to the start of the payload. Each instance owns a
/// scratch buffer that is reused between reads, so `read_at` needs
/// `&mut self`; use one reader per thread.
pub struct VolumeReader<S: BackingStore> {
    store: S,
    cipher: SectorCipher,
    sector_size: usize,
    offset: u64,
    size: u64,
    iv_tweak: u64,
    alignment: usize,
    scratch: AlignedBuf,
}

impl<S: BackingStore> VolumeReader<S> {
    /// Create a reader with the default configuration.
    pub fn new(store: S, volume: &Volume) -> Result<Self> {
        Self::with_config(store, volume, ReaderConfig::default())
    }

    /// Create a reader with a custom configuration.
    pub fn with_config(store: S, volume: &Volume, config: ReaderConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;
        Ok(Self {
            store,
            cipher: volume.sector_cipher()?,
            sector_size: volume.sector_size() as usize,
            offset: volume.offset(),
            size: volume.size(),
            iv_tweak: volume.iv_tweak(),
            alignment: config.alignment,
            scratch: AlignedBuf::new(config.alignment),
        })
    }

    /// Read decrypted bytes at `offset` into `buf`.
    ///
    /// Returns the number of bytes read, `0` at the end of the payload.
    /// Reads past the payload size are clamped.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(self.size - offset) as usize;

        let sector_size = self.sector_size as u64;
        let first_sector = offset / sector_size;
        let skip = (offset % sector_size) as usize;
        let span = ((offset + len as u64).div_ceil(sector_size) - first_sector) * sector_size;
        let span = span as usize;
        let physical = first_sector
            .checked_mul(sector_size)
            .and_then(|start| self.offset.checked_add(start))
            .ok_or_else(|| {
                Error::Format(format!("sector {} lies beyond the addressable range", first_sector))
            })?;

        let read_len = span.div_ceil(self.alignment) * self.alignment;
        self.scratch.resize(read_len);
        let n = read_full_at(&self.store, &mut self.scratch, physical).map_err(|source| {
            Error::Read {
                what: "volume data",
                offset: physical,
                source,
            }
        })?;

        // Only whole sectors can be decrypted.
        let usable = n.min(span) / self.sector_size * self.sector_size;
        if usable <= skip {
            debug!("short read at {}: {} of {} bytes", physical, n, span);
            return Ok(0);
        }

        self.cipher.decrypt_sectors(
            &mut self.scratch[..usable],
            self.sector_size,
            self.iv_tweak.wrapping_add(first_sector),
        )?;

        let count = (usable - skip).min(len);
        buf[..count].copy_from_slice(&self.scratch[skip..skip + count]);
        Ok(count)
    }

    /// Sector size of the payload.
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Stop reading and hand back the backing store.
    pub fn into_inner(mut self) -> S {
        self.scratch.wipe();
        self.store
    }

    /// Stop reading and release the backing store.
    pub fn close(self) {
        drop(self.into_inner());
    }
}

impl VolumeReader<BlockDevice> {
    /// Open the container at `path` and read `volume` from it.
    pub fn open_path(path: &Path, volume: &Volume) -> Result<Self> {
        Self::new(BlockDevice::open(path)?, volume)
    }
}
