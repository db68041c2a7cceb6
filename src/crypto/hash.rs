//! Hash algorithms named in LUKS headers.

use crate::error::{Error, Result};
use hmac::digest::{core_api::BlockSizeUser, Digest};
use hmac::SimpleHmac;
use std::fmt;

/// A hash function selected by its cryptsetup name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Ripemd160,
    Blake2b512,
    Blake2s256,
}

/// Run `$body` with `$h` bound to the digest type of `$alg`.
macro_rules! with_hash {
    ($alg:expr, $h:ident => $body:expr) => {
        match $alg {
            HashAlgorithm::Sha1 => {
                type $h = sha1::Sha1;
                $body
            }
            HashAlgorithm::Sha224 => {
                type $h = sha2::Sha224;
                $body
            }
            HashAlgorithm::Sha256 => {
                type $h = sha2::Sha256;
                $body
            }
            HashAlgorithm::Sha384 => {
                type $h = sha2::Sha384;
                $body
            }
            HashAlgorithm::Sha512 => {
                type $h = sha2::Sha512;
                $body
            }
            HashAlgorithm::Sha3_224 => {
                type $h = sha3::Sha3_224;
                $body
            }
            HashAlgorithm::Sha3_256 => {
                type $h = sha3::Sha3_256;
                $body
            }
            HashAlgorithm::Sha3_384 => {
                type $h = sha3::Sha3_384;
                $body
            }
            HashAlgorithm::Sha3_512 => {
                type $h = sha3::Sha3_512;
                $body
            }
            HashAlgorithm::Ripemd160 => {
                type $h = ripemd::Ripemd160;
                $body
            }
            HashAlgorithm::Blake2b512 => {
                type $h = blake2::Blake2b512;
                $body
            }
            HashAlgorithm::Blake2s256 => {
                type $h = blake2::Blake2s256;
                $body
            }
        }
    };
}

impl HashAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [HashAlgorithm; 12] = [
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_224,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Sha3_384,
        HashAlgorithm::Sha3_512,
        HashAlgorithm::Ripemd160,
        HashAlgorithm::Blake2b512,
        HashAlgorithm::Blake2s256,
    ];

    /// Look up an algorithm by the name cryptsetup writes into headers.
    pub fn from_name(name: &str) -> Result<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.name() == name)
            .ok_or_else(|| Error::Unsupported(format!("hash algorithm '{}'", name)))
    }

    /// The cryptsetup name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_224 => "sha3-224",
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Sha3_384 => "sha3-384",
            HashAlgorithm::Sha3_512 => "sha3-512",
            HashAlgorithm::Ripemd160 => "ripemd160",
            HashAlgorithm::Blake2b512 => "blake2b-512",
            HashAlgorithm::Blake2s256 => "blake2s-256",
        }
    }

    /// Digest length in bytes.
    pub fn output_size(&self) -> usize {
        with_hash!(self, H => <H as Digest>::output_size())
    }

    /// Hash a single buffer.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        self.digest_parts(&[data])
    }

    /// Hash the concatenation of `parts`.
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        with_hash!(self, H => {
            let mut hasher = H::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        })
    }

    /// PBKDF2 with HMAC over this hash, filling `out`.
    pub fn pbkdf2(&self, password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) -> Result<()> {
        if iterations == 0 {
            return Err(Error::KeyDerivation("PBKDF2 iteration count is zero".to_string()));
        }
        with_hash!(self, H => pbkdf2_hmac::<H>(password, salt, iterations, out))
    }
}

fn pbkdf2_hmac<D>(password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) -> Result<()>
where
    D: Digest + BlockSizeUser + Clone + Sync,
{
    pbkdf2::pbkdf2::<SimpleHmac<D>>(password, salt, iterations, out)
        .map_err(|e| Error::KeyDerivation(e.to_string()))
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(HashAlgorithm::from_name(alg.name()).unwrap(), alg);
        }
        assert_eq!(HashAlgorithm::from_name("SHA256").unwrap(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_unknown_hash_is_unsupported() {
        let err = HashAlgorithm::from_name("whirlpool").unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_output_sizes() {
        assert_eq!(HashAlgorithm::Sha1.output_size(), 20);
        assert_eq!(HashAlgorithm::Ripemd160.output_size(), 20);
        assert_eq!(HashAlgorithm::Sha224.output_size(), 28);
        assert_eq!(HashAlgorithm::Sha3_384.output_size(), 48);
        assert_eq!(HashAlgorithm::Blake2b512.output_size(), 64);
        assert_eq!(HashAlgorithm::Blake2s256.output_size(), 32);
    }

    #[test]
    fn test_sha256_digest() {
        assert_eq!(
            hex::encode(HashAlgorithm::Sha256.digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            HashAlgorithm::Sha256.digest_parts(&[b"a", b"bc"]),
            HashAlgorithm::Sha256.digest(b"abc")
        );
    }

    #[test]
    fn test_pbkdf2_sha1_rfc6070() {
        let mut out = [0u8; 20];
        HashAlgorithm::Sha1
            .pbkdf2(b"password", b"salt", 2, &mut out)
            .unwrap();
        assert_eq!(hex::encode(out), "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957");
    }

    #[test]
    fn test_pbkdf2_every_hash() {
        for alg in HashAlgorithm::ALL {
            let mut a = [0u8; 40];
            let mut b = [0u8; 40];
            alg.pbkdf2(b"foobar", b"NaCl", 3, &mut a).unwrap();
            alg.pbkdf2(b"foobar", b"NaCl", 3, &mut b).unwrap();
            assert_eq!(a, b, "{} not deterministic", alg);
            assert_ne!(a, [0u8; 40]);
        }
    }

    #[test]
    fn test_pbkdf2_zero_iterations_rejected() {
        let mut out = [0u8; 16];
        assert!(HashAlgorithm::Sha256.pbkdf2(b"p", b"s", 0, &mut out).is_err());
    }
}
