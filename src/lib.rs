//! LUKS Volume Access
//!
//! Read-only access to LUKS1 and LUKS2 encrypted containers from userspace,
//! without device-mapper.
//!
//! # Features
//!
//! - **Header parsing**: LUKS1 binary headers and LUKS2 binary+JSON headers,
//!   with checksum verification and fallback to the secondary LUKS2 header
//! - **Key slot unsealing**: PBKDF2 / Argon2i / Argon2id key derivation,
//!   anti-forensic merge and digest validation
//! - **Decrypting reads**: AES-XTS, AES-CBC (plain, plain64, ESSIV) and
//!   AES-ECB with per-sector IVs
//!
//! # Architecture
//!
//! ```text
//! Store → Device (header) → unseal_volume (KDF → decrypt → AF merge → digest) → Volume → VolumeReader
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use luks_volume::{Device, VolumeReader};
//! use std::fs::File;
//!
//! let file = File::open("/dev/sdb1").unwrap();
//! let device = Device::open(&file).unwrap();
//! println!("{} {}", device.version(), device.uuid());
//!
//! let volume = device.unseal_volume(0, b"passphrase").unwrap();
//! let mut reader = VolumeReader::new(&file, &volume).unwrap();
//!
//! let mut sector = vec![0u8; 4096];
//! reader.read_at(&mut sector, 0).unwrap();
//! ```

pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod header;
pub mod keyslot;
pub mod reader;
pub mod storage;
pub mod volume;

pub use config::ReaderConfig;
pub use device::Device;
pub use error::{Error, ErrorKind, Result};
pub use header::{LuksVersion, Metadata, Token};
pub use reader::VolumeReader;
pub use storage::BackingStore;
pub use volume::Volume;
