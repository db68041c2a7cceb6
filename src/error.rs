//! Error types for LUKS header parsing, unsealing and volume reads.

use thiserror::Error;

/// Result type alias for luks-volume operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening, unsealing or reading a LUKS container.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error at a known position of the backing store.
    #[error("failed to read {what} at offset {offset}: {source}")]
    Read {
        what: &'static str,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Permission denied when opening a raw device.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The on-disk magic is not a LUKS magic.
    #[error("Invalid LUKS header: bad magic")]
    InvalidMagic,

    /// The header version is not one this crate understands.
    #[error("Unsupported LUKS header version {0}")]
    UnsupportedVersion(u16),

    /// A LUKS2 binary header failed checksum verification.
    #[error("LUKS2 header at offset {offset} failed checksum verification")]
    ChecksumMismatch { offset: u64 },

    /// The header is truncated or structurally inconsistent.
    #[error("Malformed header: {0}")]
    Format(String),

    /// The LUKS2 JSON metadata could not be decoded.
    #[error("Malformed LUKS2 metadata: {0}")]
    Metadata(String),

    /// Unknown or unsupported cipher, hash, KDF or feature.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Key derivation rejected its parameters.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// The recovered key did not match the stored digest.
    #[error("Passphrase does not unlock key slot {slot}")]
    Authentication { slot: usize },

    /// No key slot accepted the passphrase.
    #[error("No key slot accepts this passphrase")]
    NoMatchingSlot,

    /// No active key slot with this id.
    #[error("Key slot {0} not found or disabled")]
    SlotNotFound(usize),

    /// No token with this id.
    #[error("Token {0} not found")]
    TokenNotFound(usize),

    /// Invalid reader configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad magic, version, checksum, JSON or truncated header. Fatal.
    Format,
    /// Unknown algorithm or feature. Fatal for the operation only.
    Unsupported,
    /// Wrong passphrase for the slot. Callers may try other slots.
    Authentication,
    /// Slot or token absent.
    NotFound,
    /// Backing store failure.
    Io,
    /// Rejected caller-supplied configuration.
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Read { .. } | Error::PermissionDenied(_) => ErrorKind::Io,
            Error::InvalidMagic
            | Error::UnsupportedVersion(_)
            | Error::ChecksumMismatch { .. }
            | Error::Format(_)
            | Error::Metadata(_)
            | Error::KeyDerivation(_) => ErrorKind::Format,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Authentication { .. } | Error::NoMatchingSlot => ErrorKind::Authentication,
            Error::SlotNotFound(_) | Error::TokenNotFound(_) => ErrorKind::NotFound,
            Error::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// True when the error means "wrong passphrase for this slot".
    pub fn is_authentication(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Metadata(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Metadata(format!("invalid base64: {}", e))
    }
}
