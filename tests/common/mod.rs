//! In-memory LUKS1/LUKS2 container builder shared by the integration tests.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use luks_volume::config::{luks1, LUKS2_SECONDARY_MAGIC, LUKS_MAGIC};
use luks_volume::crypto::{af, CipherSpec, HashAlgorithm, Kdf, SectorCipher};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::json;

pub const UUID: &str = "8d1f5a0e-6b1c-4e8e-9c57-2f3a5d9b7e41";

/// A built container and what went into it.
pub struct Fixture {
    pub image: Vec<u8>,
    pub key: Vec<u8>,
    pub payload_offset: u64,
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn round_up(n: u64, to: u64) -> u64 {
    n.div_ceil(to) * to
}

/// Split `key`, encrypt it under `passphrase` and return the area contents.
fn seal_material(
    key: &[u8],
    passphrase: &str,
    kdf: &Kdf,
    salt: &[u8],
    cipher: &CipherSpec,
    stripes: u32,
    af_hash: HashAlgorithm,
    rng: &mut StdRng,
) -> Vec<u8> {
    let mut material = af::split(key, stripes, af_hash, rng).unwrap().to_vec();
    material.resize(round_up(material.len() as u64, 512) as usize, 0);
    let derived = kdf.derive(passphrase.as_bytes(), salt, key.len()).unwrap();
    SectorCipher::new(cipher, &derived)
        .unwrap()
        .encrypt_sectors(&mut material, 512, 0)
        .unwrap();
    material
}

fn random(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

/// LUKS1 container parameters.
pub struct Luks1 {
    pub cipher_mode: &'static str,
    pub hash: HashAlgorithm,
    pub key_size: usize,
    pub stripes: u32,
    pub iterations: u32,
    /// `(slot, passphrase)` for every enabled slot.
    pub passphrases: Vec<(usize, &'static str)>,
}

impl Default for Luks1 {
    fn default() -> Self {
        Self {
            cipher_mode: "xts-plain64",
            hash: HashAlgorithm::Sha256,
            key_size: 64,
            stripes: luks1::STRIPES,
            iterations: 1000,
            passphrases: vec![(0, "foobar")],
        }
    }
}

impl Luks1 {
    /// Build a container whose payload is `payload` (a whole number of
    /// 512-byte sectors).
    pub fn build(&self, payload: &[u8]) -> Fixture {
        let mut rng = StdRng::seed_from_u64(0x1u64);
        let key = random(&mut rng, self.key_size);
        let cipher = CipherSpec::from_parts("aes", self.cipher_mode).unwrap();
        let kdf = Kdf::Pbkdf2 {
            hash: self.hash,
            iterations: self.iterations,
        };

        let material_sectors =
            round_up(self.key_size as u64 * u64::from(self.stripes), 512) / 512;
        let slot_sectors = round_up(material_sectors, 8);
        let payload_sectors = 8 + slot_sectors * luks1::NUM_KEY_SLOTS as u64;
        let payload_offset = payload_sectors * 512;

        let mut image = vec![0u8; payload_offset as usize];
        put(&mut image, 0, &LUKS_MAGIC);
        put(&mut image, 6, &1u16.to_be_bytes());
        put(&mut image, 8, b"aes");
        put(&mut image, 40, self.cipher_mode.as_bytes());
        put(&mut image, 72, self.hash.name().as_bytes());
        put(&mut image, 104, &(payload_sectors as u32).to_be_bytes());
        put(&mut image, 108, &(self.key_size as u32).to_be_bytes());

        let digest_salt = random(&mut rng, luks1::SALT_SIZE);
        let mut digest = [0u8; luks1::DIGEST_SIZE];
        self.hash.pbkdf2(&key, &digest_salt, 100, &mut digest).unwrap();
        put(&mut image, 112, &digest);
        put(&mut image, 132, &digest_salt);
        put(&mut image, 164, &100u32.to_be_bytes());
        put(&mut image, 168, UUID.as_bytes());

        for slot in 0..luks1::NUM_KEY_SLOTS {
            let record = luks1::KEY_SLOTS_OFFSET + slot * luks1::KEY_SLOT_SIZE;
            let kmo = 8 + slot as u64 * slot_sectors;
            put(&mut image, record + 40, &(kmo as u32).to_be_bytes());
            put(&mut image, record + 44, &self.stripes.to_be_bytes());

            let passphrase = self.passphrases.iter().find(|(id, _)| *id == slot);
            let Some((_, passphrase)) = passphrase else {
                put(&mut image, record, &luks1::KEY_DISABLED.to_be_bytes());
                continue;
            };

            let salt = random(&mut rng, luks1::SALT_SIZE);
            put(&mut image, record, &luks1::KEY_ENABLED.to_be_bytes());
            put(&mut image, record + 4, &self.iterations.to_be_bytes());
            put(&mut image, record + 8, &salt);

            let material = seal_material(
                &key,
                passphrase,
                &kdf,
                &salt,
                &cipher,
                self.stripes,
                self.hash,
                &mut rng,
            );
            put(&mut image, (kmo * 512) as usize, &material);
        }

        let mut data = payload.to_vec();
        SectorCipher::new(&cipher, &key)
            .unwrap()
            .encrypt_sectors(&mut data, 512, 0)
            .unwrap();
        image.extend(data);

        Fixture {
            image,
            key,
            payload_offset,
        }
    }
}

/// One LUKS2 key slot.
pub struct Luks2Slot {
    pub id: usize,
    pub passphrase: &'static str,
    pub kdf: Kdf,
    pub priority: Option<u8>,
}

impl Luks2Slot {
    pub fn pbkdf2(id: usize, passphrase: &'static str) -> Self {
        Self {
            id,
            passphrase,
            kdf: Kdf::Pbkdf2 {
                hash: HashAlgorithm::Sha256,
                iterations: 1000,
            },
            priority: None,
        }
    }

    pub fn with_kdf(mut self, kdf: Kdf) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// LUKS2 container parameters.
pub struct Luks2 {
    pub encryption: &'static str,
    pub key_size: usize,
    pub sector_size: u32,
    pub iv_tweak: u64,
    pub stripes: u32,
    /// Hash for the AF diffuse and the volume key digest.
    pub hash: HashAlgorithm,
    pub label: &'static str,
    /// `None` for a dynamic segment.
    pub segment_size: Option<u64>,
    pub slots: Vec<Luks2Slot>,
    /// Raw token objects by id, inserted into the JSON verbatim.
    pub tokens: Vec<(usize, String)>,
}

pub const LUKS2_HEADER_SIZE: u64 = 0x4000;

impl Default for Luks2 {
    fn default() -> Self {
        Self {
            encryption: "aes-xts-plain64",
            key_size: 64,
            sector_size: 512,
            iv_tweak: 0,
            stripes: 4000,
            hash: HashAlgorithm::Sha256,
            label: "",
            segment_size: None,
            slots: vec![Luks2Slot::pbkdf2(0, "foobar")],
            tokens: Vec::new(),
        }
    }
}

impl Luks2 {
    pub fn build(&self, payload: &[u8]) -> Fixture {
        let mut rng = StdRng::seed_from_u64(0x2u64);
        let key = random(&mut rng, self.key_size);
        let cipher = CipherSpec::parse(self.encryption).unwrap();

        let area_size = round_up(self.key_size as u64 * u64::from(self.stripes), 4096);
        let areas_start = 2 * LUKS2_HEADER_SIZE;
        let payload_offset = round_up(
            areas_start + area_size * self.slots.len() as u64,
            u64::from(self.sector_size).max(4096),
        );

        let mut image = vec![0u8; payload_offset as usize];
        let mut keyslots = serde_json::Map::new();
        for (n, slot) in self.slots.iter().enumerate() {
            let salt = random(&mut rng, 32);
            let offset = areas_start + n as u64 * area_size;
            let material = seal_material(
                &key,
                slot.passphrase,
                &slot.kdf,
                &salt,
                &cipher,
                self.stripes,
                self.hash,
                &mut rng,
            );
            put(&mut image, offset as usize, &material);

            let kdf = match &slot.kdf {
                Kdf::Pbkdf2 { hash, iterations } => json!({
                    "type": "pbkdf2", "hash": hash.name(), "iterations": iterations,
                    "salt": BASE64.encode(&salt),
                }),
                Kdf::Argon2 {
                    variant,
                    time,
                    memory,
                    parallelism,
                } => json!({
                    "type": variant.name(), "time": time, "memory": memory,
                    "cpus": parallelism, "salt": BASE64.encode(&salt),
                }),
            };
            let mut entry = json!({
                "type": "luks2",
                "key_size": self.key_size,
                "af": {"type": "luks1", "stripes": self.stripes, "hash": self.hash.name()},
                "area": {
                    "type": "raw",
                    "offset": offset.to_string(),
                    "size": area_size.to_string(),
                    "encryption": self.encryption,
                    "key_size": self.key_size,
                },
                "kdf": kdf,
            });
            if let Some(priority) = slot.priority {
                entry["priority"] = json!(priority);
            }
            keyslots.insert(slot.id.to_string(), entry);
        }

        let digest_salt = random(&mut rng, 32);
        let mut digest = [0u8; 32];
        self.hash
            .pbkdf2(&key, &digest_salt, 1000, &mut digest)
            .unwrap();
        let slot_ids: Vec<String> = self.slots.iter().map(|s| s.id.to_string()).collect();

        let json_size = LUKS2_HEADER_SIZE - 4096;
        let metadata = json!({
            "keyslots": keyslots,
            "tokens": {},
            "segments": {
                "0": {
                    "type": "crypt",
                    "offset": payload_offset.to_string(),
                    "size": self.segment_size.map_or("dynamic".to_string(), |s| s.to_string()),
                    "iv_tweak": self.iv_tweak.to_string(),
                    "encryption": self.encryption,
                    "sector_size": self.sector_size,
                }
            },
            "digests": {
                "0": {
                    "type": "pbkdf2",
                    "keyslots": slot_ids,
                    "segments": ["0"],
                    "hash": self.hash.name(),
                    "iterations": 1000,
                    "salt": BASE64.encode(&digest_salt),
                    "digest": BASE64.encode(digest),
                }
            },
            "config": {
                "json_size": json_size.to_string(),
                "keyslots_size": (payload_offset - areas_start).to_string(),
            }
        });
        let tokens = self
            .tokens
            .iter()
            .map(|(id, raw)| format!("\"{}\":{}", id, raw))
            .collect::<Vec<_>>()
            .join(",");
        let text = metadata
            .to_string()
            .replace("\"tokens\":{}", &format!("\"tokens\":{{{}}}", tokens));

        let primary = header_copy(&text, 0, 1, self.label);
        let secondary = header_copy(&text, LUKS2_HEADER_SIZE, 1, self.label);
        put(&mut image, 0, &primary);
        put(&mut image, LUKS2_HEADER_SIZE as usize, &secondary);

        let mut data = payload.to_vec();
        SectorCipher::new(&cipher, &key)
            .unwrap()
            .encrypt_sectors(&mut data, self.sector_size as usize, self.iv_tweak)
            .unwrap();
        image.extend(data);

        Fixture {
            image,
            key,
            payload_offset,
        }
    }
}

/// A checksummed LUKS2 binary header followed by its JSON area.
pub fn header_copy(json: &str, offset: u64, seqid: u64, label: &str) -> Vec<u8> {
    let mut buf = vec![0u8; LUKS2_HEADER_SIZE as usize];
    let magic = if offset == 0 {
        LUKS_MAGIC
    } else {
        LUKS2_SECONDARY_MAGIC
    };
    put(&mut buf, 0, &magic);
    put(&mut buf, 6, &2u16.to_be_bytes());
    put(&mut buf, 8, &LUKS2_HEADER_SIZE.to_be_bytes());
    put(&mut buf, 16, &seqid.to_be_bytes());
    put(&mut buf, 24, label.as_bytes());
    put(&mut buf, 72, b"sha256");
    put(&mut buf, 168, UUID.as_bytes());
    put(&mut buf, 256, &offset.to_be_bytes());
    put(&mut buf, 4096, json.as_bytes());
    let checksum = HashAlgorithm::Sha256.digest(&buf);
    put(&mut buf, 448, &checksum);
    buf
}
