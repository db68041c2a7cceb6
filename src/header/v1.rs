//! LUKS1 binary header.

use crate::config::{luks1, LUKS_MAGIC, SECTOR_SIZE};
use crate::crypto::{CipherSpec, HashAlgorithm, Kdf};
use crate::error::{Error, Result};
use crate::header::{
    be_u16, be_u32, fixed_str, AfParams, DigestRecord, KdfParams, KeyArea, KeySlot, LuksVersion,
    Metadata, Segment, SegmentSize, SlotPriority,
};
use crate::storage::{read_exact_at, BackingStore};
use log::debug;
use std::collections::BTreeMap;

/// One of the eight fixed key slot records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlotRecord {
    pub active: bool,
    pub iterations: u32,
    pub salt: [u8; luks1::SALT_SIZE],
    /// Offset of the key material in 512-byte sectors.
    pub key_material_offset: u32,
    pub stripes: u32,
}

impl SlotRecord {
    fn parse(buf: &[u8], index: usize) -> Result<Self> {
        let active = match be_u32(buf, 0) {
            luks1::KEY_ENABLED => true,
            luks1::KEY_DISABLED => false,
            state => {
                return Err(Error::Format(format!(
                    "key slot {} has invalid state {:#010x}",
                    index, state
                )))
            }
        };
        let mut salt = [0u8; luks1::SALT_SIZE];
        salt.copy_from_slice(&buf[8..40]);

        Ok(Self {
            active,
            iterations: be_u32(buf, 4),
            salt,
            key_material_offset: be_u32(buf, 40),
            stripes: be_u32(buf, 44),
        })
    }
}

/// Decoded LUKS1 header.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub cipher_name: String,
    pub cipher_mode: String,
    pub hash_spec: String,
    /// Start of the payload in 512-byte sectors.
    pub payload_offset: u32,
    pub key_bytes: u32,
    pub mk_digest: [u8; luks1::DIGEST_SIZE],
    pub mk_digest_salt: [u8; luks1::SALT_SIZE],
    pub mk_digest_iterations: u32,
    pub uuid: String,
    pub slots: Vec<SlotRecord>,
}

impl Header {
    /// Decode the fixed 592-byte header.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < luks1::HEADER_SIZE {
            return Err(Error::Format("truncated LUKS1 header".to_string()));
        }
        if buf[..6] != LUKS_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = be_u16(buf, 6);
        if version != 1 {
            return Err(Error::UnsupportedVersion(version));
        }

        let mut mk_digest = [0u8; luks1::DIGEST_SIZE];
        mk_digest.copy_from_slice(&buf[112..132]);
        let mut mk_digest_salt = [0u8; luks1::SALT_SIZE];
        mk_digest_salt.copy_from_slice(&buf[132..164]);

        let slots = (0..luks1::NUM_KEY_SLOTS)
            .map(|i| {
                let start = luks1::KEY_SLOTS_OFFSET + i * luks1::KEY_SLOT_SIZE;
                SlotRecord::parse(&buf[start..start + luks1::KEY_SLOT_SIZE], i)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cipher_name: fixed_str(&buf[8..40], "cipher name")?,
            cipher_mode: fixed_str(&buf[40..72], "cipher mode")?,
            hash_spec: fixed_str(&buf[72..104], "hash spec")?,
            payload_offset: be_u32(buf, 104),
            key_bytes: be_u32(buf, 108),
            mk_digest,
            mk_digest_salt,
            mk_digest_iterations: be_u32(buf, 164),
            uuid: fixed_str(&buf[168..208], "UUID")?,
            slots,
        })
    }

    /// Express the header in the format-independent model.
    pub fn into_metadata(self) -> Result<Metadata> {
        let cipher = CipherSpec::from_parts(&self.cipher_name, &self.cipher_mode)?;
        let key_size = self.key_bytes as usize;
        cipher.check_key_size(key_size)?;
        let hash = HashAlgorithm::from_name(&self.hash_spec)?;

        let mut slots = BTreeMap::new();
        for (id, record) in self.slots.iter().enumerate() {
            if !record.active {
                continue;
            }
            if record.stripes == 0 || record.iterations == 0 {
                return Err(Error::Format(format!(
                    "key slot {} has {} stripes and {} iterations",
                    id, record.stripes, record.iterations
                )));
            }
            let material = (key_size as u64) * u64::from(record.stripes);
            slots.insert(
                id,
                KeySlot {
                    id,
                    key_size,
                    priority: SlotPriority::Normal,
                    kdf: KdfParams {
                        kdf: Kdf::Pbkdf2 {
                            hash,
                            iterations: record.iterations,
                        },
                        salt: record.salt.to_vec(),
                    },
                    af: AfParams {
                        stripes: record.stripes,
                        hash,
                    },
                    area: KeyArea {
                        offset: u64::from(record.key_material_offset) * SECTOR_SIZE,
                        size: material.div_ceil(SECTOR_SIZE) * SECTOR_SIZE,
                        cipher: cipher.clone(),
                        key_size,
                    },
                },
            );
        }

        let data_offset = u64::from(self.payload_offset) * SECTOR_SIZE;
        let mut segments = BTreeMap::new();
        segments.insert(
            0,
            Segment {
                id: 0,
                offset: data_offset,
                size: SegmentSize::Dynamic,
                iv_tweak: 0,
                cipher,
                sector_size: SECTOR_SIZE as u32,
            },
        );

        let digest = DigestRecord {
            id: 0,
            hash,
            iterations: self.mk_digest_iterations,
            salt: self.mk_digest_salt.to_vec(),
            digest: self.mk_digest.to_vec(),
            keyslots: slots.keys().copied().collect(),
            segments: vec![0],
        };

        debug!(
            "LUKS1 header {}: {} active key slots, payload at {}",
            self.uuid,
            slots.len(),
            data_offset
        );

        Ok(Metadata {
            version: LuksVersion::V1,
            uuid: self.uuid,
            label: None,
            subsystem: None,
            sequence_id: 0,
            header_size: data_offset,
            slots,
            tokens: Vec::new(),
            segments,
            digests: vec![digest],
        })
    }
}

/// Read and normalize a LUKS1 header.
pub(crate) fn read<S: BackingStore + ?Sized>(store: &S) -> Result<Metadata> {
    let mut buf = [0u8; luks1::HEADER_SIZE];
    read_exact_at(store, &mut buf, 0, "LUKS1 header")?;
    Header::parse(&buf)?.into_metadata()
}
