//! On-disk LUKS headers.
//!
//! Both header versions are decoded into the same [`Metadata`] model so that
//! unsealing and reading never need to know which format they came from:
//! LUKS1's fixed slot array and single implicit segment are expressed as the
//! same keyslot/segment/digest records LUKS2 stores in its JSON area.

pub(crate) mod json;
pub(crate) mod v1;
pub(crate) mod v2;

use crate::config::LUKS_MAGIC;
use crate::crypto::{CipherSpec, HashAlgorithm, Kdf};
use crate::error::{Error, Result};
use crate::storage::{read_exact_at, BackingStore};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// LUKS header format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuksVersion {
    V1,
    V2,
}

impl LuksVersion {
    /// The type tag cryptsetup uses, `LUKS1` or `LUKS2`.
    pub fn type_name(&self) -> &'static str {
        match self {
            LuksVersion::V1 => "LUKS1",
            LuksVersion::V2 => "LUKS2",
        }
    }
}

impl fmt::Display for LuksVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Key derivation parameters of a key slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub kdf: Kdf,
    pub salt: Vec<u8>,
}

impl KdfParams {
    /// Derive `len` bytes from `passphrase`.
    pub fn derive(&self, passphrase: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
        self.kdf.derive(passphrase, &self.salt, len)
    }
}

/// Anti-forensic splitter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfParams {
    pub stripes: u32,
    pub hash: HashAlgorithm,
}

/// Where and how a key slot's striped key material is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyArea {
    /// Byte offset in the container.
    pub offset: u64,
    /// Byte size reserved for the material.
    pub size: u64,
    /// Cipher protecting the material.
    pub cipher: CipherSpec,
    /// Key size of `cipher`, i.e. the length the KDF must produce.
    pub key_size: usize,
}

/// LUKS2 key slot priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlotPriority {
    /// Only used when requested explicitly.
    Ignore,
    Normal,
    /// Tried before normal slots.
    High,
}

/// An active key slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySlot {
    pub id: usize,
    /// Size of the volume key this slot protects.
    pub key_size: usize,
    pub priority: SlotPriority,
    pub kdf: KdfParams,
    pub af: AfParams,
    pub area: KeyArea,
}

/// Size of an encrypted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSize {
    /// Extends to the end of the container.
    Dynamic,
    Fixed(u64),
}

/// An encrypted data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: usize,
    /// Byte offset of the payload.
    pub offset: u64,
    pub size: SegmentSize,
    /// Added to every sector index before it becomes an IV.
    pub iv_tweak: u64,
    pub cipher: CipherSpec,
    pub sector_size: u32,
}

/// Links key slots to the segments their key decrypts and stores the value
/// a recovered key must reproduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRecord {
    pub id: usize,
    pub hash: HashAlgorithm,
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub digest: Vec<u8>,
    pub keyslots: Vec<usize>,
    pub segments: Vec<usize>,
}

impl DigestRecord {
    /// Check whether `key` is the key this digest was computed from.
    pub fn verify(&self, key: &[u8]) -> Result<bool> {
        let mut computed = Zeroizing::new(vec![0u8; self.digest.len()]);
        self.hash
            .pbkdf2(key, &self.salt, self.iterations, &mut computed)?;
        Ok(constant_time_eq(&computed, &self.digest))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Unlock metadata attached to key slots (LUKS2 only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: usize,
    pub token_type: String,
    /// Key slots the token unlocks.
    pub slots: Vec<usize>,
    /// The token's JSON object exactly as stored in the header.
    pub payload: String,
}

impl Token {
    /// Parse the payload into a JSON value.
    pub fn payload_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Format-independent view of a LUKS header.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub version: LuksVersion,
    pub uuid: String,
    pub label: Option<String>,
    pub subsystem: Option<String>,
    /// LUKS2 sequence id; zero for LUKS1.
    pub sequence_id: u64,
    /// Bytes before the first data segment (LUKS1) or binary+JSON size (LUKS2).
    pub header_size: u64,
    /// Active key slots by id.
    pub slots: BTreeMap<usize, KeySlot>,
    /// Tokens in ascending id order.
    pub tokens: Vec<Token>,
    pub segments: BTreeMap<usize, Segment>,
    pub digests: Vec<DigestRecord>,
}

impl Metadata {
    /// Parse whichever LUKS header `store` holds.
    pub fn read<S: BackingStore + ?Sized>(store: &S) -> Result<Self> {
        let mut prefix = [0u8; 8];
        read_exact_at(store, &mut prefix, 0, "LUKS header")?;

        if prefix[..6] != LUKS_MAGIC {
            // A LUKS2 container with a damaged primary header may still have
            // an intact secondary copy.
            debug!("no LUKS magic at offset 0, searching for a secondary LUKS2 header");
            return v2::read(store).map_err(|e| {
                debug!("no secondary LUKS2 header: {}", e);
                Error::InvalidMagic
            });
        }

        match be_u16(&prefix, 6) {
            1 => v1::read(store),
            2 => v2::read(store),
            v => Err(Error::UnsupportedVersion(v)),
        }
    }

    /// The digest record that validates keys recovered from slot `id`.
    pub fn digest_for_slot(&self, id: usize) -> Option<&DigestRecord> {
        self.digests.iter().find(|d| d.keyslots.contains(&id))
    }
}

pub(crate) fn be_u16(buf: &[u8], offset: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_be_bytes(b)
}

pub(crate) fn be_u32(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(b)
}

pub(crate) fn be_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(b)
}

/// Decode a fixed-width, NUL-padded string field.
pub(crate) fn fixed_str(field: &[u8], what: &str) -> Result<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_string)
        .map_err(|_| Error::Format(format!("{} is not valid UTF-8", what)))
}
