//! Memory aliasing between transient textures.
//!
//! An [`AliasArena`] groups textures that share one allocation into regions.
//! The texture that owns the memory is the region's host (slot 0); every
//! other slot is an alias created with
//! [`GraphicsDevice::create_aliased_texture`]. At most one slot occupies a
//! region at a time. Switching occupant bumps the region's generation and
//! produces an aliasing [`Barrier`] that must be recorded before the new
//! occupant is written.
//!
//! A retired alias frees its slot; the region then has no occupant until the
//! next acquisition, which again produces an aliasing barrier.
//!
//! Acquisitions hand out an [`AliasHandle`] carrying the generation they were
//! made at. Resolving a handle after another slot took over the memory fails
//! with [`GraphicsError::StaleAliasHandle`], which turns a use-after-alias
//! into an error instead of silently reading garbage.

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::types::TextureDescriptor;

use super::{Barrier, Texture};

/// Index of a shared allocation inside an [`AliasArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);

/// One texture placed in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasSlot {
    region: RegionId,
    slot: u32,
}

impl AliasSlot {
    /// Region the slot lives in.
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Whether this slot is the texture that owns the memory.
    pub fn is_host(&self) -> bool {
        self.slot == 0
    }
}

/// Proof of an acquisition, valid until another slot acquires the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasHandle {
    slot: AliasSlot,
    generation: u64,
}

impl AliasHandle {
    pub fn slot(&self) -> AliasSlot {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Region {
    host: Arc<Texture>,
    /// Slot 0 is always `None`; the host is stored separately.
    aliases: Vec<Option<Arc<Texture>>>,
    occupant: Option<u32>,
    generation: u64,
}

impl Region {
    fn slot(&self, slot: u32) -> Option<&Arc<Texture>> {
        if slot == 0 {
            Some(&self.host)
        } else {
            self.aliases.get(slot as usize).and_then(Option::as_ref)
        }
    }
}

/// Tracks occupancy of shared texture allocations.
#[derive(Debug, Default)]
pub struct AliasArena {
    regions: Vec<Region>,
}

impl AliasArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn `host` into a shareable region. The host is the initial occupant.
    pub fn create_region(&mut self, host: Arc<Texture>) -> AliasSlot {
        let region = RegionId(self.regions.len() as u32);
        log::trace!(
            "AliasArena: region {} hosted by {} ({} bytes)",
            region.0,
            host.debug_name(),
            host.memory_size_in_bytes()
        );
        self.regions.push(Region {
            host,
            aliases: vec![None],
            occupant: Some(0),
            generation: 0,
        });
        AliasSlot { region, slot: 0 }
    }

    /// Create an alias of the region's host and register it as a new slot.
    ///
    /// An alias larger than its host is a programming error: it asserts in
    /// debug builds and returns [`GraphicsError::AliasTooLarge`] otherwise.
    pub fn declare(
        &mut self,
        device: &Arc<GraphicsDevice>,
        region: RegionId,
        descriptor: &TextureDescriptor,
    ) -> Result<(AliasSlot, Arc<Texture>), GraphicsError> {
        let entry = self.region_mut(region)?;
        debug_assert!(
            descriptor.memory_size_in_bytes() <= entry.host.memory_size_in_bytes(),
            "alias {:?} does not fit in host {}",
            descriptor.label,
            entry.host.debug_name()
        );

        let texture = device.create_aliased_texture(descriptor, &entry.host)?;
        let slot = match entry.aliases.iter().skip(1).position(Option::is_none) {
            Some(free) => free as u32 + 1,
            None => {
                entry.aliases.push(None);
                entry.aliases.len() as u32 - 1
            }
        };
        entry.aliases[slot as usize] = Some(Arc::clone(&texture));
        Ok((AliasSlot { region, slot }, texture))
    }

    /// Drop an alias from its region.
    ///
    /// If the alias occupied the region, the region is left without an
    /// occupant and every outstanding handle becomes stale. Retiring the
    /// host is not supported; use [`clear`](Self::clear).
    pub fn retire(&mut self, slot: AliasSlot) -> Result<(), GraphicsError> {
        if slot.is_host() {
            return Err(GraphicsError::InvalidParameter(
                "alias region hosts cannot be retired".to_string(),
            ));
        }
        let entry = self.region_mut(slot.region)?;
        let removed = entry
            .aliases
            .get_mut(slot.slot as usize)
            .and_then(Option::take)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown alias slot {slot:?}")))?;
        if entry.occupant == Some(slot.slot) {
            entry.occupant = None;
            entry.generation += 1;
        }
        log::trace!("AliasArena: retired {}", removed.debug_name());
        Ok(())
    }

    /// Make `slot` the occupant of its region.
    ///
    /// Returns the handle and, when the occupant changed, the aliasing barrier
    /// to record before the texture is used.
    pub fn acquire(&mut self, slot: AliasSlot) -> Result<(AliasHandle, Option<Barrier>), GraphicsError> {
        let entry = self.region_mut(slot.region)?;
        let texture = entry
            .slot(slot.slot)
            .cloned()
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown alias slot {slot:?}")))?;

        let barrier = if entry.occupant == Some(slot.slot) {
            None
        } else {
            let before = entry.occupant.and_then(|o| entry.slot(o).cloned());
            entry.occupant = Some(slot.slot);
            entry.generation += 1;
            log::trace!(
                "AliasArena: {} takes region {} (generation {})",
                texture.debug_name(),
                slot.region.0,
                entry.generation
            );
            Some(Barrier::Aliasing {
                before,
                after: texture,
            })
        };

        Ok((
            AliasHandle {
                slot,
                generation: entry.generation,
            },
            barrier,
        ))
    }

    /// Texture behind a handle, provided no other slot took over since.
    pub fn resolve(&self, handle: AliasHandle) -> Result<Arc<Texture>, GraphicsError> {
        let entry = self.region(handle.slot.region)?;
        let texture = entry
            .slot(handle.slot.slot)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown alias slot {:?}", handle.slot)))?;
        if entry.generation != handle.generation || entry.occupant != Some(handle.slot.slot) {
            return Err(GraphicsError::StaleAliasHandle {
                resource: texture.debug_name(),
                handle_generation: handle.generation,
                current_generation: entry.generation,
            });
        }
        Ok(Arc::clone(texture))
    }

    /// Slot currently occupying `region`.
    pub fn occupant(&self, region: RegionId) -> Option<AliasSlot> {
        let entry = self.region(region).ok()?;
        entry.occupant.map(|slot| AliasSlot { region, slot })
    }

    /// Current generation of `region`.
    pub fn generation(&self, region: RegionId) -> Option<u64> {
        self.region(region).ok().map(|entry| entry.generation)
    }

    /// Texture registered for `slot`.
    pub fn texture(&self, slot: AliasSlot) -> Option<&Arc<Texture>> {
        self.region(slot.region).ok()?.slot(slot.slot)
    }

    /// Number of regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Forget every region, releasing the arena's texture references.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    fn region(&self, region: RegionId) -> Result<&Region, GraphicsError> {
        self.regions
            .get(region.0 as usize)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown alias region {}", region.0)))
    }

    fn region_mut(&mut self, region: RegionId) -> Result<&mut Region, GraphicsError> {
        self.regions
            .get_mut(region.0 as usize)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown alias region {}", region.0)))
    }
}
