//! Passphrase key derivation for key slots.
//!
//! LUKS1 slots always use PBKDF2. LUKS2 slots may use PBKDF2, Argon2i or
//! Argon2id; the variant and its costs come from the slot metadata.

use crate::crypto::hash::HashAlgorithm;
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

/// Argon2 flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argon2Variant {
    Argon2i,
    Argon2id,
}

impl Argon2Variant {
    fn algorithm(self) -> Algorithm {
        match self {
            Argon2Variant::Argon2i => Algorithm::Argon2i,
            Argon2Variant::Argon2id => Algorithm::Argon2id,
        }
    }

    /// Name used in LUKS2 metadata.
    pub fn name(self) -> &'static str {
        match self {
            Argon2Variant::Argon2i => "argon2i",
            Argon2Variant::Argon2id => "argon2id",
        }
    }
}

/// A key derivation function with its cost parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kdf {
    /// PBKDF2 with HMAC over `hash`.
    Pbkdf2 { hash: HashAlgorithm, iterations: u32 },
    /// Argon2 (version 0x13).
    Argon2 {
        variant: Argon2Variant,
        /// Number of passes.
        time: u32,
        /// Memory in KiB.
        memory: u32,
        /// Lanes.
        parallelism: u32,
    },
}

impl Kdf {
    /// Name used in LUKS2 metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Kdf::Pbkdf2 { .. } => "pbkdf2",
            Kdf::Argon2 { variant, .. } => variant.name(),
        }
    }

    /// Derive `len` bytes from `passphrase` and `salt`.
    pub fn derive(&self, passphrase: &[u8], salt: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let mut key = Zeroizing::new(vec![0u8; len]);
        match *self {
            Kdf::Pbkdf2 { hash, iterations } => {
                hash.pbkdf2(passphrase, salt, iterations, &mut key)?;
            }
            Kdf::Argon2 {
                variant,
                time,
                memory,
                parallelism,
            } => {
                let params = Params::new(memory, time, parallelism, Some(len))
                    .map_err(|e| Error::KeyDerivation(e.to_string()))?;

                let argon2 = Argon2::new(variant.algorithm(), Version::V0x13, params);

                argon2
                    .hash_password_into(passphrase, salt, &mut key)
                    .map_err(|e| Error::KeyDerivation(e.to_string()))?;
            }
        }
        Ok(key)
    }
}
