//! The unsealed volume: key plus payload geometry.

use crate::crypto::{CipherSpec, SectorCipher};
use crate::error::{Error, Result};
use crate::header::LuksVersion;
use std::fmt;
use zeroize::Zeroizing;

/// Everything needed to decrypt a container's payload.
///
/// The key is wiped when the volume is dropped and never printed.
#[derive(Clone)]
pub struct Volume {
    version: LuksVersion,
    key: Zeroizing<Vec<u8>>,
    cipher: CipherSpec,
    sector_size: u32,
    offset: u64,
    size: u64,
    iv_tweak: u64,
}

impl Volume {
    /// Describe a payload of `size` bytes at `offset`, encrypted with
    /// `cipher` under `key` in sectors of `sector_size` bytes.
    pub fn new(
        version: LuksVersion,
        key: Zeroizing<Vec<u8>>,
        cipher: CipherSpec,
        sector_size: u32,
        offset: u64,
        size: u64,
    ) -> Result<Self> {
        cipher.check_key_size(key.len())?;
        if !sector_size.is_power_of_two() || sector_size < 512 {
            return Err(Error::Format(format!("invalid sector size {}", sector_size)));
        }
        if offset.checked_add(size).is_none() {
            return Err(Error::Format(format!(
                "payload at {} with size {} overflows",
                offset, size
            )));
        }
        Ok(Self {
            version,
            key,
            cipher,
            sector_size,
            offset,
            size,
            iv_tweak: 0,
        })
    }

    /// Offset every sector index by `iv_tweak` before it becomes an IV.
    pub fn with_iv_tweak(mut self, iv_tweak: u64) -> Self {
        self.iv_tweak = iv_tweak;
        self
    }

    /// Format of the container the volume came from.
    pub fn version(&self) -> LuksVersion {
        self.version
    }

    /// `LUKS1` or `LUKS2`.
    pub fn luks_type(&self) -> &'static str {
        self.version.type_name()
    }

    /// The volume key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Length of the volume key in bytes.
    pub fn key_size(&self) -> usize {
        self.key.len()
    }

    /// Payload cipher.
    pub fn cipher(&self) -> &CipherSpec {
        &self.cipher
    }

    /// Encryption sector size in bytes.
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Byte offset of the payload in the container.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Added to every sector index before it becomes an IV.
    pub fn iv_tweak(&self) -> u64 {
        self.iv_tweak
    }

    pub(crate) fn sector_cipher(&self) -> Result<SectorCipher> {
        SectorCipher::new(&self.cipher, &self.key)
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("type", &self.luks_type())
            .field("cipher", &self.cipher.name())
            .field("key_size", &self.key.len())
            .field("sector_size", &self.sector_size)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("iv_tweak", &self.iv_tweak)
            .finish_non_exhaustive()
    }
}
