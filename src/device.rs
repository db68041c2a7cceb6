//! Device façade over a parsed LUKS header.

use crate::error::{Error, Result};
use crate::header::{KeySlot, LuksVersion, Metadata, Segment, SegmentSize, SlotPriority, Token};
use crate::keyslot;
use crate::storage::BackingStore;
use crate::volume::Volume;
use log::{debug, info};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// An opened LUKS container.
///
/// The device borrows its backing store and never writes to it. All
/// methods take `&self`, so slots may be tried from several threads.
pub struct Device<'s, S: BackingStore + ?Sized> {
    store: &'s S,
    metadata: Metadata,
}

impl<'s, S: BackingStore + ?Sized> Device<'s, S> {
    /// Parse the LUKS header at the start of `store`.
    pub fn open(store: &'s S) -> Result<Self> {
        let metadata = Metadata::read(store)?;
        info!(
            "opened {} container {} with {} key slots",
            metadata.version,
            metadata.uuid,
            metadata.slots.len()
        );
        Ok(Self { store, metadata })
    }

    /// LUKS format version of the header.
    pub fn version(&self) -> LuksVersion {
        self.metadata.version
    }

    /// UUID as written in the header.
    pub fn uuid(&self) -> &str {
        &self.metadata.uuid
    }

    /// LUKS2 label, if one is set.
    pub fn label(&self) -> Option<&str> {
        self.metadata.label.as_deref()
    }

    /// The full normalized header.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Ids of the active key slots in ascending order.
    pub fn slots(&self) -> Vec<usize> {
        self.metadata.slots.keys().copied().collect()
    }

    /// The active key slot `id`.
    pub fn slot(&self, id: usize) -> Result<&KeySlot> {
        self.metadata.slots.get(&id).ok_or(Error::SlotNotFound(id))
    }

    /// Tokens in ascending id order. Always empty for LUKS1.
    pub fn tokens(&self) -> &[Token] {
        &self.metadata.tokens
    }

    /// The token with id `id`.
    pub fn token(&self, id: usize) -> Result<&Token> {
        self.metadata
            .tokens
            .iter()
            .find(|t| t.id == id)
            .ok_or(Error::TokenNotFound(id))
    }

    /// Recover the volume key through slot `id`.
    ///
    /// A wrong passphrase yields [`Error::Authentication`]; the device is
    /// unchanged and may be asked again.
    pub fn unseal_volume(&self, id: usize, passphrase: &[u8]) -> Result<Volume> {
        let slot = self.slot(id)?;
        let digest = self
            .metadata
            .digest_for_slot(id)
            .ok_or_else(|| Error::Format(format!("key slot {} has no digest", id)))?;
        let segment = digest
            .segments
            .iter()
            .find_map(|s| self.metadata.segments.get(s))
            .ok_or_else(|| Error::Format(format!("digest {} protects no segment", digest.id)))?;

        let key = keyslot::unseal(self.store, slot, passphrase, digest)?;
        let size = self.segment_size(segment)?;

        Ok(Volume::new(
            self.metadata.version,
            key,
            segment.cipher.clone(),
            segment.sector_size,
            segment.offset,
            size,
        )?
        .with_iv_tweak(segment.iv_tweak))
    }

    /// Try every usable slot until one accepts `passphrase`.
    ///
    /// High priority slots go first, then normal ones, each group in
    /// ascending id order. Slots with priority `Ignore` are skipped.
    pub fn unseal_any(&self, passphrase: &[u8]) -> Result<(usize, Volume)> {
        for id in unlock_order(&self.metadata.slots) {
            match self.unseal_volume(id, passphrase) {
                Ok(volume) => return Ok((id, volume)),
                Err(e) if e.is_authentication() => debug!("key slot {}: {}", id, e),
                Err(e) => return Err(e),
            }
        }
        Err(Error::NoMatchingSlot)
    }

    fn segment_size(&self, segment: &Segment) -> Result<u64> {
        match segment.size {
            SegmentSize::Fixed(size) => Ok(size),
            SegmentSize::Dynamic => {
                let total = self.store.size().map_err(|source| Error::Read {
                    what: "container size",
                    offset: 0,
                    source,
                })?;
                Ok(total.saturating_sub(segment.offset))
            }
        }
    }
}

fn unlock_order(slots: &BTreeMap<usize, KeySlot>) -> Vec<usize> {
    let mut order: Vec<&KeySlot> = slots
        .values()
        .filter(|s| s.priority != SlotPriority::Ignore)
        .collect();
    order.sort_by_key(|s| (Reverse(s.priority), s.id));
    order.into_iter().map(|s| s.id).collect()
}
