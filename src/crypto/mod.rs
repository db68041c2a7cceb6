//! Cryptographic primitives for LUKS containers.
//!
//! This module provides:
//! - Hash algorithms by cryptsetup name, with PBKDF2
//! - PBKDF2 and Argon2 key derivation
//! - The anti-forensic splitter
//! - AES sector ciphers (XTS, CBC, ECB)

pub mod af;
mod cipher;
mod hash;
mod kdf;

pub use cipher::{CipherSpec, IvMode, Mode, SectorCipher};
pub use hash::HashAlgorithm;
pub use kdf::{Argon2Variant, Kdf};
