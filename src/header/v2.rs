//! LUKS2 header: two checksummed binary headers, each followed by a copy of
//! the JSON metadata.

use crate::config::{luks2, LUKS2_SECONDARY_MAGIC, LUKS_MAGIC, SECTOR_SIZE};
use crate::crypto::{Argon2Variant, CipherSpec, HashAlgorithm, Kdf};
use crate::error::{Error, Result};
use crate::header::json::{JsonDigest, JsonKdf, JsonKeyslot, JsonSegment, JsonTokenHeader, Luks2Json};
use crate::header::{
    be_u16, be_u64, fixed_str, AfParams, DigestRecord, KdfParams, KeyArea, KeySlot, LuksVersion,
    Metadata, Segment, SegmentSize, SlotPriority, Token,
};
use crate::keyslot;
use crate::storage::{read_exact_at, BackingStore};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use std::collections::BTreeMap;

/// One verified header copy with its JSON text.
#[derive(Debug, Clone)]
pub(crate) struct HeaderCopy {
    /// Where the copy was found.
    pub offset: u64,
    pub header_size: u64,
    pub sequence_id: u64,
    pub label: String,
    pub checksum_alg: String,
    pub uuid: String,
    pub subsystem: String,
    pub json: String,
}

impl HeaderCopy {
    /// Read and verify the copy at `offset`.
    pub fn read<S: BackingStore + ?Sized>(store: &S, offset: u64) -> Result<Self> {
        let mut bin = vec![0u8; luks2::BINARY_HEADER_SIZE];
        read_exact_at(store, &mut bin, offset, "LUKS2 binary header")?;

        let magic = if offset == 0 {
            LUKS_MAGIC
        } else {
            LUKS2_SECONDARY_MAGIC
        };
        if bin[..6] != magic {
            return Err(Error::InvalidMagic);
        }
        let version = be_u16(&bin, 6);
        if version != 2 {
            return Err(Error::UnsupportedVersion(version));
        }

        let header_size = be_u64(&bin, 8);
        if !(luks2::MIN_HEADER_SIZE..=luks2::MAX_HEADER_SIZE).contains(&header_size)
            || !header_size.is_power_of_two()
        {
            return Err(Error::Format(format!(
                "invalid LUKS2 header size {:#x}",
                header_size
            )));
        }
        let recorded_offset = be_u64(&bin, 256);
        if recorded_offset != offset {
            return Err(Error::Format(format!(
                "LUKS2 header at {:#x} claims offset {:#x}",
                offset, recorded_offset
            )));
        }

        let checksum_alg = fixed_str(&bin[72..104], "checksum algorithm")?;
        let hash = HashAlgorithm::from_name(&checksum_alg)?;

        let mut area = vec![0u8; header_size as usize];
        area[..luks2::BINARY_HEADER_SIZE].copy_from_slice(&bin);
        read_exact_at(
            store,
            &mut area[luks2::BINARY_HEADER_SIZE..],
            offset + luks2::BINARY_HEADER_SIZE as u64,
            "LUKS2 JSON area",
        )?;

        let csum_range = luks2::CHECKSUM_OFFSET..luks2::CHECKSUM_OFFSET + luks2::CHECKSUM_SIZE;
        let mut stored = [0u8; luks2::CHECKSUM_SIZE];
        stored.copy_from_slice(&area[csum_range.clone()]);
        area[csum_range].fill(0);
        let computed = hash.digest(&area);
        if computed[..] != stored[..computed.len()] {
            return Err(Error::ChecksumMismatch { offset });
        }

        let json_area = &area[luks2::BINARY_HEADER_SIZE..];
        let end = json_area
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(json_area.len());
        let json = std::str::from_utf8(&json_area[..end])
            .map_err(|_| Error::Metadata("JSON area is not valid UTF-8".to_string()))?
            .to_string();

        Ok(Self {
            offset,
            header_size,
            sequence_id: be_u64(&bin, 16),
            label: fixed_str(&bin[24..72], "label")?,
            checksum_alg,
            uuid: fixed_str(&bin[168..208], "UUID")?,
            subsystem: fixed_str(&bin[208..256], "subsystem")?,
            json,
        })
    }

    /// Decode the JSON area and express it in the format-independent model.
    pub fn into_metadata(self) -> Result<Metadata> {
        let json: Luks2Json = serde_json::from_str(&self.json)?;

        let json_size = self.header_size - luks2::BINARY_HEADER_SIZE as u64;
        if json.config.json_size != json_size {
            return Err(Error::Format(format!(
                "JSON area size {} does not match header size {}",
                json.config.json_size, self.header_size
            )));
        }
        if let Some(requirements) = &json.config.requirements {
            if !requirements.mandatory.is_empty() {
                return Err(Error::Unsupported(format!(
                    "mandatory requirements: {}",
                    requirements.mandatory.join(", ")
                )));
            }
        }

        // Key slot areas live between the second header copy and the end
        // of the keyslots region.
        let areas_start = 2 * self.header_size;
        let areas_end = areas_start
            .checked_add(json.config.keyslots_size)
            .ok_or_else(|| Error::Format("keyslots region overflows".to_string()))?;

        let mut slots = BTreeMap::new();
        for (key, slot) in &json.keyslots {
            let id = parse_id(key, "keyslot")?;
            let slot = keyslot(id, slot)?;
            let end = slot.area.offset.checked_add(slot.area.size);
            if slot.area.offset < areas_start || end.map_or(true, |end| end > areas_end) {
                return Err(Error::Format(format!(
                    "keyslot {} area {:#x}+{:#x} lies outside the keyslots region {:#x}..{:#x}",
                    id, slot.area.offset, slot.area.size, areas_start, areas_end
                )));
            }
            slots.insert(id, slot);
        }

        let mut segments = BTreeMap::new();
        for (key, segment) in &json.segments {
            let id = parse_id(key, "segment")?;
            segments.insert(id, self::segment(id, segment)?);
        }

        let mut digests = json
            .digests
            .iter()
            .map(|(key, d)| digest(parse_id(key, "digest")?, d, &slots, &segments))
            .collect::<Result<Vec<_>>>()?;
        digests.sort_by_key(|d| d.id);

        let mut tokens = Vec::with_capacity(json.tokens.len());
        for (key, raw) in &json.tokens {
            let id = parse_id(key, "token")?;
            let header: JsonTokenHeader = serde_json::from_str(raw.get())?;
            let token_slots = parse_refs(&header.keyslots, "keyslot", |s| slots.contains_key(&s))?;
            tokens.push(Token {
                id,
                token_type: header.kind,
                slots: token_slots,
                payload: raw.get().to_string(),
            });
        }
        tokens.sort_by_key(|t| t.id);

        debug!(
            "LUKS2 header {} (seqid {}, {}): {} key slots, {} segments, {} tokens",
            self.uuid,
            self.sequence_id,
            self.checksum_alg,
            slots.len(),
            segments.len(),
            tokens.len()
        );

        Ok(Metadata {
            version: LuksVersion::V2,
            uuid: self.uuid,
            label: non_empty(self.label),
            subsystem: non_empty(self.subsystem),
            sequence_id: self.sequence_id,
            header_size: self.header_size,
            slots,
            tokens,
            segments,
            digests,
        })
    }
}

/// Pick the newest valid header copy.
pub(crate) fn select<S: BackingStore + ?Sized>(store: &S) -> Result<HeaderCopy> {
    let primary = HeaderCopy::read(store, 0);
    let secondary = match &primary {
        Ok(p) => HeaderCopy::read(store, p.header_size),
        Err(e) => {
            warn!("primary LUKS2 header unusable: {}", e);
            scan_secondary(store)
        }
    };

    match (primary, secondary) {
        (Ok(p), Ok(s)) => {
            if s.sequence_id > p.sequence_id {
                warn!(
                    "secondary LUKS2 header is newer (seqid {} > {}), using it",
                    s.sequence_id, p.sequence_id
                );
                Ok(s)
            } else {
                Ok(p)
            }
        }
        (Ok(p), Err(e)) => {
            warn!("secondary LUKS2 header unusable: {}", e);
            Ok(p)
        }
        (Err(_), Ok(s)) => {
            debug!("using secondary LUKS2 header at {:#x}", s.offset);
            Ok(s)
        }
        (Err(e), Err(_)) => Err(e),
    }
}

fn scan_secondary<S: BackingStore + ?Sized>(store: &S) -> Result<HeaderCopy> {
    let mut last = Error::InvalidMagic;
    for &offset in luks2::SECONDARY_OFFSETS.iter() {
        match HeaderCopy::read(store, offset) {
            Ok(copy) => return Ok(copy),
            Err(e) => {
                debug!("no secondary LUKS2 header at {:#x}: {}", offset, e);
                last = e;
            }
        }
    }
    Err(last)
}

/// Read and normalize a LUKS2 header.
pub(crate) fn read<S: BackingStore + ?Sized>(store: &S) -> Result<Metadata> {
    select(store)?.into_metadata()
}

fn keyslot(id: usize, slot: &JsonKeyslot) -> Result<KeySlot> {
    if slot.kind != "luks2" {
        return Err(Error::Unsupported(format!(
            "keyslot {} has type '{}'",
            id, slot.kind
        )));
    }

    let kdf = match &slot.kdf {
        Some(kdf) => kdf_params(id, kdf)?,
        None => return Err(Error::Format(format!("keyslot {} has no kdf", id))),
    };
    let af = match &slot.af {
        Some(af) if af.kind == "luks1" => AfParams {
            stripes: af.stripes,
            hash: HashAlgorithm::from_name(&af.hash)?,
        },
        Some(af) => {
            return Err(Error::Unsupported(format!(
                "keyslot {} uses AF type '{}'",
                id, af.kind
            )))
        }
        None => return Err(Error::Format(format!("keyslot {} has no af", id))),
    };
    if af.stripes == 0 {
        return Err(Error::Format(format!("keyslot {} has zero stripes", id)));
    }
    if slot.key_size == 0 || slot.key_size > luks2::MAX_KEY_SIZE {
        return Err(Error::Format(format!(
            "keyslot {} has invalid key size {}",
            id, slot.key_size
        )));
    }

    let area = &slot.area;
    if area.kind != "raw" {
        return Err(Error::Unsupported(format!(
            "keyslot {} uses area type '{}'",
            id, area.kind
        )));
    }
    let cipher = match &area.encryption {
        Some(spec) => CipherSpec::parse(spec)?,
        None => return Err(Error::Format(format!("keyslot {} area has no encryption", id))),
    };
    let area_key_size = area.key_size.unwrap_or(slot.key_size);
    cipher.check_key_size(area_key_size)?;
    if area.offset % SECTOR_SIZE != 0 {
        return Err(Error::Format(format!(
            "keyslot {} area offset {} is not sector aligned",
            id, area.offset
        )));
    }

    let priority = match slot.priority {
        Some(0) => SlotPriority::Ignore,
        None | Some(1) => SlotPriority::Normal,
        Some(2) => SlotPriority::High,
        Some(p) => {
            return Err(Error::Format(format!(
                "keyslot {} has invalid priority {}",
                id, p
            )))
        }
    };

    let parsed = KeySlot {
        id,
        key_size: slot.key_size,
        priority,
        kdf,
        af,
        area: KeyArea {
            offset: area.offset,
            size: area.size,
            cipher,
            key_size: area_key_size,
        },
    };
    let needed = keyslot::material_size(&parsed)?;
    if needed > area.size {
        return Err(Error::Format(format!(
            "keyslot {} needs {} bytes of key material but its area holds {}",
            id, needed, area.size
        )));
    }
    Ok(parsed)
}

fn kdf_params(id: usize, kdf: &JsonKdf) -> Result<KdfParams> {
    let missing = |field: &str| Error::Format(format!("keyslot {} kdf has no {}", id, field));

    let parsed = match kdf.kind.as_str() {
        "pbkdf2" => Kdf::Pbkdf2 {
            hash: HashAlgorithm::from_name(kdf.hash.as_deref().ok_or_else(|| missing("hash"))?)?,
            iterations: kdf.iterations.ok_or_else(|| missing("iterations"))?,
        },
        "argon2i" | "argon2id" => Kdf::Argon2 {
            variant: if kdf.kind == "argon2i" {
                Argon2Variant::Argon2i
            } else {
                Argon2Variant::Argon2id
            },
            time: kdf.time.ok_or_else(|| missing("time"))?,
            memory: kdf.memory.ok_or_else(|| missing("memory"))?,
            parallelism: kdf.cpus.ok_or_else(|| missing("cpus"))?,
        },
        other => {
            return Err(Error::Unsupported(format!(
                "keyslot {} uses KDF '{}'",
                id, other
            )))
        }
    };

    Ok(KdfParams {
        kdf: parsed,
        salt: BASE64.decode(&kdf.salt)?,
    })
}

fn segment(id: usize, segment: &JsonSegment) -> Result<Segment> {
    if segment.kind != "crypt" {
        return Err(Error::Unsupported(format!(
            "segment {} has type '{}'",
            id, segment.kind
        )));
    }
    if segment.integrity.is_some() {
        return Err(Error::Unsupported(format!(
            "segment {} is integrity protected",
            id
        )));
    }
    let cipher = match &segment.encryption {
        Some(spec) => CipherSpec::parse(spec)?,
        None => return Err(Error::Format(format!("segment {} has no encryption", id))),
    };
    let sector_size = segment.sector_size.unwrap_or(SECTOR_SIZE as u32);
    if !(512..=4096).contains(&sector_size) || !sector_size.is_power_of_two() {
        return Err(Error::Format(format!(
            "segment {} has invalid sector size {}",
            id, sector_size
        )));
    }
    if !segment.flags.is_empty() {
        debug!("segment {} flags: {}", id, segment.flags.join(", "));
    }
    if let SegmentSize::Fixed(size) = segment.size {
        if segment.offset.checked_add(size).is_none() {
            return Err(Error::Format(format!(
                "segment {} at {} with size {} overflows",
                id, segment.offset, size
            )));
        }
    }

    Ok(Segment {
        id,
        offset: segment.offset,
        size: segment.size,
        iv_tweak: segment.iv_tweak,
        cipher,
        sector_size,
    })
}

fn digest(
    id: usize,
    digest: &JsonDigest,
    slots: &BTreeMap<usize, KeySlot>,
    segments: &BTreeMap<usize, Segment>,
) -> Result<DigestRecord> {
    if digest.kind != "pbkdf2" {
        return Err(Error::Unsupported(format!(
            "digest {} has type '{}'",
            id, digest.kind
        )));
    }
    let missing = |field: &str| Error::Format(format!("digest {} has no {}", id, field));

    Ok(DigestRecord {
        id,
        hash: HashAlgorithm::from_name(digest.hash.as_deref().ok_or_else(|| missing("hash"))?)?,
        iterations: digest.iterations.ok_or_else(|| missing("iterations"))?,
        salt: BASE64.decode(&digest.salt)?,
        digest: BASE64.decode(&digest.digest)?,
        keyslots: parse_refs(&digest.keyslots, "keyslot", |s| slots.contains_key(&s))?,
        segments: parse_refs(&digest.segments, "segment", |s| segments.contains_key(&s))?,
    })
}

fn parse_id(key: &str, what: &str) -> Result<usize> {
    key.parse()
        .map_err(|_| Error::Format(format!("invalid {} id '{}'", what, key)))
}

/// Parse a list of id references, each of which must exist.
fn parse_refs(refs: &[String], what: &str, exists: impl Fn(usize) -> bool) -> Result<Vec<usize>> {
    refs.iter()
        .map(|r| {
            let id = parse_id(r, what)?;
            if exists(id) {
                Ok(id)
            } else {
                Err(Error::Format(format!("reference to missing {} {}", what, id)))
            }
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
