//! Sector ciphers addressed by dm-crypt style specifications.
//!
//! A specification such as `aes-xts-plain64` names the block cipher, the
//! chaining mode and the IV generator. Every sector is processed
//! independently with an IV (or XTS tweak) derived from its index.

use crate::crypto::hash::HashAlgorithm;
use crate::error::{Error, Result};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use std::fmt;
use xts_mode::Xts128;
use zeroize::Zeroizing;

const BLOCK_SIZE: usize = 16;

/// How the per-sector IV is computed from the sector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvMode {
    /// Low 32 bits of the sector index, little-endian.
    Plain,
    /// 64-bit sector index, little-endian.
    Plain64,
    /// Sector index encrypted under a key hashed from the volume key.
    Essiv(HashAlgorithm),
}

impl IvMode {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(IvMode::Plain),
            "plain64" => Ok(IvMode::Plain64),
            _ => match s.strip_prefix("essiv:") {
                Some(hash) => Ok(IvMode::Essiv(HashAlgorithm::from_name(hash)?)),
                None => Err(Error::Unsupported(format!("IV mode '{}'", s))),
            },
        }
    }
}

/// Chaining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Xts(IvMode),
    Cbc(IvMode),
    Ecb,
}

/// A parsed cipher specification. Only AES is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherSpec {
    mode: Mode,
    name: String,
}

impl CipherSpec {
    /// Parse a combined specification such as `aes-xts-plain64`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (cipher, mode) = spec
            .split_once('-')
            .ok_or_else(|| Error::Unsupported(format!("cipher specification '{}'", spec)))?;
        Self::from_parts(cipher, mode)
    }

    /// Build a specification from the separate LUKS1 cipher name and mode.
    pub fn from_parts(cipher: &str, mode: &str) -> Result<Self> {
        if cipher != "aes" {
            return Err(Error::Unsupported(format!("cipher '{}'", cipher)));
        }

        let mode = match mode.split_once('-') {
            Some(("xts", iv)) => match IvMode::parse(iv)? {
                IvMode::Essiv(_) => {
                    return Err(Error::Unsupported(format!("cipher mode '{}'", mode)))
                }
                iv => Mode::Xts(iv),
            },
            Some(("cbc", iv)) => Mode::Cbc(IvMode::parse(iv)?),
            None if mode == "ecb" => Mode::Ecb,
            _ => return Err(Error::Unsupported(format!("cipher mode '{}'", mode))),
        };

        Ok(Self {
            mode,
            name: format!("{}-{}", cipher, mode_name(&mode)),
        })
    }

    /// The chaining mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The canonical `cipher-mode-iv` string.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check that a key of `len` bytes fits this cipher.
    pub fn check_key_size(&self, len: usize) -> Result<()> {
        let valid = match self.mode {
            Mode::Xts(_) => matches!(len, 32 | 48 | 64),
            Mode::Cbc(_) | Mode::Ecb => matches!(len, 16 | 24 | 32),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::Unsupported(format!(
                "{}-bit key for {}",
                len * 8,
                self.name
            )))
        }
    }
}

fn mode_name(mode: &Mode) -> String {
    fn iv_name(iv: &IvMode) -> String {
        match iv {
            IvMode::Plain => "plain".to_string(),
            IvMode::Plain64 => "plain64".to_string(),
            IvMode::Essiv(hash) => format!("essiv:{}", hash),
        }
    }
    match mode {
        Mode::Xts(iv) => format!("xts-{}", iv_name(iv)),
        Mode::Cbc(iv) => format!("cbc-{}", iv_name(iv)),
        Mode::Ecb => "ecb".to_string(),
    }
}

impl fmt::Display for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

enum AesBlock {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesBlock {
    fn new(key: &[u8]) -> Result<Self> {
        Ok(match key.len() {
            16 => AesBlock::Aes128(aes_key(key)?),
            24 => AesBlock::Aes192(aes_key(key)?),
            32 => AesBlock::Aes256(aes_key(key)?),
            n => return Err(Error::Unsupported(format!("{}-bit AES key", n * 8))),
        })
    }

    fn encrypt(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            AesBlock::Aes128(c) => c.encrypt_block(block),
            AesBlock::Aes192(c) => c.encrypt_block(block),
            AesBlock::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            AesBlock::Aes128(c) => c.decrypt_block(block),
            AesBlock::Aes192(c) => c.decrypt_block(block),
            AesBlock::Aes256(c) => c.decrypt_block(block),
        }
    }
}

enum IvGen {
    Plain,
    Plain64,
    Essiv(AesBlock),
}

impl IvGen {
    fn new(mode: IvMode, key: &[u8]) -> Result<Self> {
        Ok(match mode {
            IvMode::Plain => IvGen::Plain,
            IvMode::Plain64 => IvGen::Plain64,
            IvMode::Essiv(hash) => {
                let salt = Zeroizing::new(hash.digest(key));
                IvGen::Essiv(AesBlock::new(&salt)?)
            }
        })
    }

    fn iv(&self, sector: u64) -> [u8; BLOCK_SIZE] {
        let mut iv = [0u8; BLOCK_SIZE];
        match self {
            IvGen::Plain => iv[..4].copy_from_slice(&(sector as u32).to_le_bytes()),
            IvGen::Plain64 => iv[..8].copy_from_slice(&sector.to_le_bytes()),
            IvGen::Essiv(cipher) => {
                iv[..8].copy_from_slice(&sector.to_le_bytes());
                cipher.encrypt(&mut iv);
            }
        }
        iv
    }
}

enum Engine {
    Xts128(Xts128<Aes128>),
    Xts192(Xts128<Aes192>),
    Xts256(Xts128<Aes256>),
    Cbc { cipher: AesBlock, iv: IvGen },
    Ecb(AesBlock),
}

/// A keyed sector cipher.
pub struct SectorCipher {
    spec: CipherSpec,
    engine: Engine,
}

impl SectorCipher {
    /// Key `spec` with `key`.
    pub fn new(spec: &CipherSpec, key: &[u8]) -> Result<Self> {
        spec.check_key_size(key.len())?;

        let engine = match spec.mode {
            Mode::Xts(_) => {
                let (k1, k2) = key.split_at(key.len() / 2);
                match k1.len() {
                    16 => Engine::Xts128(Xts128::new(aes_key(k1)?, aes_key(k2)?)),
                    24 => Engine::Xts192(Xts128::new(aes_key(k1)?, aes_key(k2)?)),
                    _ => Engine::Xts256(Xts128::new(aes_key(k1)?, aes_key(k2)?)),
                }
            }
            Mode::Cbc(iv) => Engine::Cbc {
                cipher: AesBlock::new(key)?,
                iv: IvGen::new(iv, key)?,
            },
            Mode::Ecb => Engine::Ecb(AesBlock::new(key)?),
        };

        Ok(Self {
            spec: spec.clone(),
            engine,
        })
    }

    /// The specification this cipher was keyed for.
    pub fn spec(&self) -> &CipherSpec {
        &self.spec
    }

    /// Decrypt consecutive sectors in place; the first has index `first_sector`.
    pub fn decrypt_sectors(&self, data: &mut [u8], sector_size: usize, first_sector: u64) -> Result<()> {
        check_sector_geometry(data.len(), sector_size)?;
        for (i, sector) in data.chunks_exact_mut(sector_size).enumerate() {
            self.decrypt_sector(sector, first_sector.wrapping_add(i as u64));
        }
        Ok(())
    }

    /// Encrypt consecutive sectors in place; the first has index `first_sector`.
    pub fn encrypt_sectors(&self, data: &mut [u8], sector_size: usize, first_sector: u64) -> Result<()> {
        check_sector_geometry(data.len(), sector_size)?;
        for (i, sector) in data.chunks_exact_mut(sector_size).enumerate() {
            self.encrypt_sector(sector, first_sector.wrapping_add(i as u64));
        }
        Ok(())
    }

    fn decrypt_sector(&self, sector: &mut [u8], index: u64) {
        match &self.engine {
            Engine::Xts128(xts) => xts.decrypt_sector(sector, self.tweak(index)),
            Engine::Xts192(xts) => xts.decrypt_sector(sector, self.tweak(index)),
            Engine::Xts256(xts) => xts.decrypt_sector(sector, self.tweak(index)),
            Engine::Cbc { cipher, iv } => {
                let mut prev = iv.iv(index);
                for block in sector.chunks_exact_mut(BLOCK_SIZE) {
                    let mut saved = [0u8; BLOCK_SIZE];
                    saved.copy_from_slice(block);
                    cipher.decrypt(block);
                    xor_block(block, &prev);
                    prev = saved;
                }
            }
            Engine::Ecb(cipher) => {
                for block in sector.chunks_exact_mut(BLOCK_SIZE) {
                    cipher.decrypt(block);
                }
            }
        }
    }

    fn encrypt_sector(&self, sector: &mut [u8], index: u64) {
        match &self.engine {
            Engine::Xts128(xts) => xts.encrypt_sector(sector, self.tweak(index)),
            Engine::Xts192(xts) => xts.encrypt_sector(sector, self.tweak(index)),
            Engine::Xts256(xts) => xts.encrypt_sector(sector, self.tweak(index)),
            Engine::Cbc { cipher, iv } => {
                let mut prev = iv.iv(index);
                for block in sector.chunks_exact_mut(BLOCK_SIZE) {
                    xor_block(block, &prev);
                    cipher.encrypt(block);
                    prev.copy_from_slice(block);
                }
            }
            Engine::Ecb(cipher) => {
                for block in sector.chunks_exact_mut(BLOCK_SIZE) {
                    cipher.encrypt(block);
                }
            }
        }
    }

    fn tweak(&self, index: u64) -> [u8; BLOCK_SIZE] {
        let mut tweak = [0u8; BLOCK_SIZE];
        match self.spec.mode {
            Mode::Xts(IvMode::Plain) => tweak[..4].copy_from_slice(&(index as u32).to_le_bytes()),
            _ => tweak[..8].copy_from_slice(&index.to_le_bytes()),
        }
        tweak
    }
}

impl fmt::Debug for SectorCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectorCipher")
            .field("spec", &self.spec.name)
            .finish_non_exhaustive()
    }
}

fn aes_key<C: KeyInit>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| Error::Unsupported(format!("{}-bit AES key", key.len() * 8)))
}

fn xor_block(block: &mut [u8], other: &[u8; BLOCK_SIZE]) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

fn check_sector_geometry(len: usize, sector_size: usize) -> Result<()> {
    if sector_size < BLOCK_SIZE || sector_size % BLOCK_SIZE != 0 {
        return Err(Error::Format(format!("invalid sector size {}", sector_size)));
    }
    if len % sector_size != 0 {
        return Err(Error::Format(format!(
            "buffer of {} bytes is not a whole number of {}-byte sectors",
            len, sector_size
        )));
    }
    Ok(())
}
