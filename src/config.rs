//! Configuration constants and types for LUKS volumes.

/// Magic at the start of a LUKS1 header and a primary LUKS2 header.
pub const LUKS_MAGIC: [u8; 6] = *b"LUKS\xba\xbe";

/// Magic at the start of a secondary LUKS2 header.
pub const LUKS2_SECONDARY_MAGIC: [u8; 6] = *b"SKUL\xba\xbe";

/// Sector size used for offsets in LUKS1 and for key slot areas.
pub const SECTOR_SIZE: u64 = 512;

/// Default alignment for unbuffered (O_DIRECT) reads.
pub const DIRECT_IO_ALIGNMENT: usize = 4096;

/// LUKS1 on-disk layout.
pub mod luks1 {
    /// Total size of the binary header.
    pub const HEADER_SIZE: usize = 592;

    /// Number of key slot records.
    pub const NUM_KEY_SLOTS: usize = 8;

    /// Size of one key slot record.
    pub const KEY_SLOT_SIZE: usize = 48;

    /// Offset of the first key slot record.
    pub const KEY_SLOTS_OFFSET: usize = 208;

    /// Master key digest length.
    pub const DIGEST_SIZE: usize = 20;

    /// Salt length for slots and the master key digest.
    pub const SALT_SIZE: usize = 32;

    /// Key slot state: enabled.
    pub const KEY_ENABLED: u32 = 0x00AC_71F3;

    /// Key slot state: disabled.
    pub const KEY_DISABLED: u32 = 0x0000_DEAD;

    /// Anti-forensic stripe count written by cryptsetup.
    pub const STRIPES: u32 = 4000;
}

/// LUKS2 on-disk layout.
pub mod luks2 {
    /// Size of the binary part of each header copy.
    pub const BINARY_HEADER_SIZE: usize = 4096;

    /// Length of the checksum field.
    pub const CHECKSUM_SIZE: usize = 64;

    /// Offset of the checksum field.
    pub const CHECKSUM_OFFSET: usize = 448;

    /// Smallest valid header size (binary + JSON).
    pub const MIN_HEADER_SIZE: u64 = 0x4000;

    /// Largest valid header size (binary + JSON).
    pub const MAX_HEADER_SIZE: u64 = 0x40_0000;

    /// Offsets probed for the secondary header when the primary is unusable.
    pub const SECONDARY_OFFSETS: [u64; 9] = [
        0x4000, 0x8000, 0x1_0000, 0x2_0000, 0x4_0000, 0x8_0000, 0x10_0000, 0x20_0000, 0x40_0000,
    ];

    /// Key slot areas are always encrypted in 512-byte sectors.
    pub const AREA_SECTOR_SIZE: usize = 512;

    /// Largest volume key a key slot may hold.
    pub const MAX_KEY_SIZE: usize = 512;
}

/// Configuration for decrypting reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Physical read lengths are rounded up to a multiple of this value.
    pub alignment: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            alignment: DIRECT_IO_ALIGNMENT,
        }
    }
}

impl ReaderConfig {
    /// Create a reader configuration with a custom alignment.
    pub fn new(alignment: usize) -> Self {
        Self { alignment }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err("Alignment must be a power of 2".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReaderConfig::default().validate().is_ok());
        assert_eq!(ReaderConfig::default().alignment, 4096);
    }

    #[test]
    fn test_rejects_bad_alignment() {
        assert!(ReaderConfig::new(0).validate().is_err());
        assert!(ReaderConfig::new(1000).validate().is_err());
        assert!(ReaderConfig::new(512).validate().is_ok());
    }

    #[test]
    fn test_luks1_layout_adds_up() {
        assert_eq!(
            luks1::KEY_SLOTS_OFFSET + luks1::NUM_KEY_SLOTS * luks1::KEY_SLOT_SIZE,
            luks1::HEADER_SIZE
        );
    }
}
