//! Entity handles and the recyclable entity index.
//!
//! An [`Entity`] is a packed `index | generation` value (see
//! [`crate::engine::types`]). The [`EntityIndex`] owns one slot per index and
//! maps each live handle to its [`EntityRecord`]: the archetype it lives in
//! and its global row there.
//!
//! ## Invariants
//! - A handle is alive iff its slot is marked alive and the slot's generation
//!   equals the handle's generation.
//! - Releasing a slot bumps its generation (wrapping at `0xFFFF`), so every
//!   handle issued before the release becomes stale.
//! - A reserved-but-unplaced entity (a deferred create that has not been
//!   replayed yet) is alive but has no record.

use std::fmt;

use crate::engine::error::{violation, CapacityError};
use crate::engine::types::{
    ArchetypeHandle, EntityID, GenerationID, IndexID, RowID,
    GENERATION_MASK, INDEX_BITS, INDEX_CAP, INDEX_MASK,
};


/// Opaque handle to an entity.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Entity(pub EntityID);

#[inline]
const fn make_id(index: IndexID, generation: GenerationID) -> EntityID {
    ((generation as EntityID) << INDEX_BITS) | (index as EntityID)
}

impl Entity {
    /// Builds a handle from its parts.
    #[inline]
    pub const fn from_parts(index: IndexID, generation: GenerationID) -> Self {
        Entity(make_id(index, generation))
    }

    /// Dense slot of this handle.
    #[inline]
    pub const fn index(self) -> IndexID {
        (self.0 & INDEX_MASK) as IndexID
    }

    /// Generation of this handle.
    #[inline]
    pub const fn generation(self) -> GenerationID {
        ((self.0 & GENERATION_MASK) >> INDEX_BITS) as GenerationID
    }

    /// Raw 64-bit value.
    #[inline]
    pub const fn to_bits(self) -> EntityID {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Where a placed entity lives: its archetype and its global row there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    /// Archetype slot in the graph arena.
    pub archetype: ArchetypeHandle,
    /// Global row across the archetype's chunks.
    pub row: RowID,
}

/// Recyclable table of entity slots.
///
/// Growth doubles the slot table on demand (never below 1024 slots at a
/// time); the only hard limit is the 32-bit index space.

#[derive(Default)]
pub struct EntityIndex {
    generations: Vec<GenerationID>,
    alive: Vec<bool>,
    records: Vec<Option<EntityRecord>>,
    free_store: Vec<IndexID>,
    live: usize,
}

impl EntityIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index with room for `capacity` entities, clamped to the
    /// 32-bit index space.

    pub fn with_capacity(capacity: usize) -> Self {
        let mut index = Self::default();
        let capacity = (capacity as u64).min(INDEX_CAP as u64 + 1);
        if let Err(e) = index.ensure_capacity(capacity) {
            violation(e);
        }
        index
    }

    fn ensure_capacity(&mut self, additional: u64) -> Result<(), CapacityError> {
        if additional == 0 { return Ok(()); }

        let current = self.generations.len() as u64;
        let needed = current + additional;
        let capacity = INDEX_CAP as u64 + 1;
        if needed > capacity {
            return Err(CapacityError { entities_needed: needed, capacity });
        }

        let needed = needed as usize;
        self.generations.resize(needed, 0);
        self.alive.resize(needed, false);
        self.records.resize(needed, None);

        // reversed so that `pop` hands out low indices first
        for index in (current..needed as u64).rev() {
            self.free_store.push(index as IndexID);
        }
        Ok(())
    }

    /// Reserves a fresh handle. The entity is alive but not yet placed in
    /// any archetype.

    pub fn reserve(&mut self) -> Result<Entity, CapacityError> {
        let index = match self.free_store.pop() {
            Some(index) => index,
            None => {
                let grow = (self.generations.len() as u64).max(1024);
                let room = (INDEX_CAP as u64 + 1).saturating_sub(self.generations.len() as u64);
                self.ensure_capacity(grow.min(room).max(1))?;
                match self.free_store.pop() {
                    Some(index) => index,
                    None => {
                        return Err(CapacityError {
                            entities_needed: self.generations.len() as u64 + 1,
                            capacity: INDEX_CAP as u64 + 1,
                        })
                    }
                }
            }
        };

        let slot = index as usize;
        self.alive[slot] = true;
        self.records[slot] = None;
        self.live += 1;
        Ok(Entity::from_parts(index, self.generations[slot]))
    }

    /// Releases `entity`'s slot and bumps its generation.
    ///
    /// Returns `false` if the handle was not alive.

    pub fn release(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) { return false; }
        let slot = entity.index() as usize;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.alive[slot] = false;
        self.records[slot] = None;
        self.free_store.push(entity.index());
        self.live -= 1;
        true
    }

    /// Returns `true` if `entity` refers to the current occupant of its slot.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        slot < self.generations.len()
            && self.alive[slot]
            && self.generations[slot] == entity.generation()
    }

    /// Returns the record of a live, placed entity.
    #[inline]
    pub fn record(&self, entity: Entity) -> Option<EntityRecord> {
        if self.is_alive(entity) { self.records[entity.index() as usize] } else { None }
    }

    /// Points a live entity at a new archetype row.
    ///
    /// ## Panics
    /// Debug builds assert that `entity` is alive.

    pub fn set_record(&mut self, entity: Entity, record: EntityRecord) {
        debug_assert!(
            self.is_alive(entity),
            "set_record was called on a dead or stale entity. Entity: {:?}, Record: {:?}",
            entity, record
        );
        let slot = entity.index() as usize;
        if slot < self.records.len() {
            self.records[slot] = Some(record);
        }
    }

    /// Returns the live handle currently occupying `index`, if any.
    pub fn alive_at(&self, index: IndexID) -> Option<Entity> {
        let slot = index as usize;
        if slot < self.alive.len() && self.alive[slot] {
            Some(Entity::from_parts(index, self.generations[slot]))
        } else {
            None
        }
    }

    /// Number of live entities, reserved ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
