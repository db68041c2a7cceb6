//! Key slot unsealing.
//!
//! A key slot stores the volume key split into anti-forensic stripes and
//! encrypted under a key derived from the passphrase. Unsealing runs the
//! pipeline backwards: derive, decrypt the stripes, merge, then check the
//! result against the digest record.

use crate::config::luks2::AREA_SECTOR_SIZE;
use crate::crypto::{af, SectorCipher};
use crate::error::{Error, Result};
use crate::header::{DigestRecord, KeySlot};
use crate::storage::{read_exact_at, BackingStore};
use log::debug;
use zeroize::Zeroizing;

/// Bytes of key material stored for `slot`, rounded up to whole sectors.
pub fn material_size(slot: &KeySlot) -> Result<u64> {
    (slot.key_size as u64)
        .checked_mul(u64::from(slot.af.stripes))
        .and_then(|raw| raw.checked_next_multiple_of(AREA_SECTOR_SIZE as u64))
        .ok_or_else(|| {
            Error::Format(format!(
                "key slot {}: {} stripes of {} bytes overflow",
                slot.id, slot.af.stripes, slot.key_size
            ))
        })
}

/// Recover the volume key protected by `slot`.
///
/// Returns [`Error::Authentication`] when the passphrase does not open the
/// slot. Any other error means the slot or the container is unusable.
pub fn unseal<S: BackingStore + ?Sized>(
    store: &S,
    slot: &KeySlot,
    passphrase: &[u8],
    digest: &DigestRecord,
) -> Result<Zeroizing<Vec<u8>>> {
    let len = material_size(slot)?;
    if len > slot.area.size {
        return Err(Error::Format(format!(
            "key slot {} needs {} bytes of key material but its area holds {}",
            slot.id, len, slot.area.size
        )));
    }

    debug!(
        "key slot {}: deriving {} bytes with {}",
        slot.id,
        slot.area.key_size,
        slot.kdf.kdf.name()
    );
    let derived = slot.kdf.derive(passphrase, slot.area.key_size)?;

    let mut material = Zeroizing::new(vec![0u8; len as usize]);
    read_exact_at(store, &mut material, slot.area.offset, "key slot material")?;

    SectorCipher::new(&slot.area.cipher, &derived)?.decrypt_sectors(
        &mut material,
        AREA_SECTOR_SIZE,
        0,
    )?;

    let candidate = af::merge(&material, slot.key_size, slot.af.stripes, slot.af.hash)?;

    if digest.verify(&candidate)? {
        debug!("key slot {} unsealed", slot.id);
        Ok(candidate)
    } else {
        Err(Error::Authentication { slot: slot.id })
    }
}
