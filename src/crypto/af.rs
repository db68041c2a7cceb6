//! Anti-forensic information splitter.
//!
//! A key of `key_size` bytes is stored as `stripes` blocks of the same size.
//! All stripes are needed to rebuild it: each intermediate stripe is XORed
//! into an accumulator that is then diffused through the hash, so losing any
//! stripe loses the key.

use crate::crypto::hash::HashAlgorithm;
use crate::error::{Error, Result};
use rand::RngCore;
use zeroize::Zeroizing;

/// Rebuild a key from its striped material.
///
/// `material` must hold at least `key_size * stripes` bytes; trailing bytes
/// (sector padding) are ignored.
pub fn merge(
    material: &[u8],
    key_size: usize,
    stripes: u32,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>> {
    let stripes = stripes as usize;
    check_geometry(material.len(), key_size, stripes)?;

    let mut acc = Zeroizing::new(vec![0u8; key_size]);
    let mut blocks = material[..key_size * stripes].chunks_exact(key_size);

    for block in blocks.by_ref().take(stripes - 1) {
        xor_into(&mut acc, block);
        diffuse(&mut acc, hash);
    }
    if let Some(last) = blocks.next() {
        xor_into(&mut acc, last);
    }

    Ok(acc)
}

/// Spread `key` over `stripes` blocks so that [`merge`] restores it.
pub fn split<R: RngCore>(
    key: &[u8],
    stripes: u32,
    hash: HashAlgorithm,
    rng: &mut R,
) -> Result<Zeroizing<Vec<u8>>> {
    let stripes = stripes as usize;
    let key_size = key.len();
    check_geometry(key_size * stripes, key_size, stripes)?;

    let mut material = Zeroizing::new(vec![0u8; key_size * stripes]);
    let mut acc = Zeroizing::new(vec![0u8; key_size]);

    let (head, last) = material.split_at_mut(key_size * (stripes - 1));
    for block in head.chunks_exact_mut(key_size) {
        rng.fill_bytes(block);
        xor_into(&mut acc, block);
        diffuse(&mut acc, hash);
    }
    for ((out, k), a) in last.iter_mut().zip(key).zip(acc.iter()) {
        *out = k ^ a;
    }

    Ok(material)
}

fn check_geometry(available: usize, key_size: usize, stripes: usize) -> Result<()> {
    if key_size == 0 || stripes == 0 {
        return Err(Error::Format(format!(
            "invalid AF geometry: key size {}, {} stripes",
            key_size, stripes
        )));
    }
    let needed = key_size
        .checked_mul(stripes)
        .ok_or_else(|| Error::Format("AF material size overflows".to_string()))?;
    if available < needed {
        return Err(Error::Format(format!(
            "AF material too short: need {} bytes, have {}",
            needed, available
        )));
    }
    Ok(())
}

fn xor_into(acc: &mut [u8], block: &[u8]) {
    for (a, b) in acc.iter_mut().zip(block) {
        *a ^= b;
    }
}

/// Replace each digest-sized block `i` of `buf` with `H(be32(i) || block)`.
/// A trailing partial block takes the prefix of its hash.
fn diffuse(buf: &mut [u8], hash: HashAlgorithm) {
    let digest_size = hash.output_size();
    for (i, block) in buf.chunks_mut(digest_size).enumerate() {
        let iv = (i as u32).to_be_bytes();
        let digest = Zeroizing::new(hash.digest_parts(&[&iv[..], &*block]));
        let len = block.len();
        block.copy_from_slice(&digest[..len]);
    }
}
