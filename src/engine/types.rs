//! Core ECS Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental types, identifiers, bit layouts and
//! constants** used throughout the engine. Every other subsystem (registry,
//! entity index, archetype graph, chunk store, query engine, deferred buffer)
//! speaks in terms of the aliases declared here.
//!
//! ## Entity Representation
//!
//! Entities are encoded as a packed 64-bit integer:
//!
//! ```text
//! | flags (8) | unused (8) | generation (16) | index (32) |
//! ```
//!
//! - **Index** is the dense slot in the entity index.
//! - **Generation** is bumped every time a slot is recycled, so a stale handle
//!   to a previous occupant no longer compares equal.
//! - **Flags** are reserved for id kinds; the top bit marks relation pairs
//!   and the bit below it marks pairs whose target is a component type
//!   rather than an entity.
//!
//! ## Relation Pairs
//!
//! A pair id packs two 32-bit ids, an *action* (`first`) and a *target*
//! (`second`), into one [`ComponentID`]:
//!
//! ```text
//! PAIR_FLAG | first << 32 | second
//! ```
//!
//! Pair ids are only ever decoded with [`pair_first`] / [`pair_second`]; they
//! are never used directly as array indices, which is why the two-tier
//! lookup tables route them to their hash-map tier.
//!
//! ## Chunks
//!
//! Archetype storage is paged into chunks of [`CHUNK_CAP`] rows. A global row
//! index splits into `(row >> CHUNK_LOG2, row & CHUNK_MASK)`.
//!
//! All widths are validated with static assertions at compile time.

use std::any::Any;

use crate::engine::component::{register_component, ComponentInfo};


/// Bit-width type used for compile-time layout calculations.
pub type Bits = u8;

/// Globally unique entity identifier encoded as a packed 64-bit value.
pub type EntityID = u64;
/// Dense slot of an entity within the entity index.
pub type IndexID = u32;
/// Generation counter used to detect stale entities.
pub type GenerationID = u16;

/// Identifier for a component, tag or relation pair.
pub type ComponentID = u64;
/// Canonical identity of an archetype (hash of its sorted component ids).
pub type ArchetypeID = u64;
/// Arena slot of an archetype inside the archetype graph.
pub type ArchetypeHandle = u32;
/// Chunk index within an archetype.
pub type ChunkID = u32;
/// Global row index within an archetype (spans all of its chunks).
pub type RowID = u32;

/// Logical step counter stamped onto writes for change detection.
pub type Tick = u64;

/// Total number of bits in an [`EntityID`].
pub const ENTITY_BITS: Bits = 64;
/// Number of bits reserved for the dense index.
pub const INDEX_BITS: Bits = 32;
/// Number of bits reserved for the generation counter.
pub const GENERATION_BITS: Bits = 16;
/// Number of bits reserved for id flags.
pub const FLAG_BITS: Bits = 8;

const _: [(); 1] = [(); (INDEX_BITS + GENERATION_BITS + FLAG_BITS <= ENTITY_BITS) as usize];
const _: [(); 1] = [(); (GENERATION_BITS <= 16) as usize];

const fn mask(bits: Bits) -> EntityID {
    if bits == 0 { 0 } else { ((1 as EntityID) << bits) - 1 }
}

/// Mask selecting the index portion of an [`EntityID`].
pub const INDEX_MASK: EntityID = mask(INDEX_BITS);
/// Mask selecting the generation portion of an [`EntityID`].
pub const GENERATION_MASK: EntityID = mask(GENERATION_BITS) << INDEX_BITS;
/// Mask selecting the flag byte of an id.
pub const ID_FLAGS_MASK: EntityID = mask(FLAG_BITS) << (ENTITY_BITS - FLAG_BITS);
/// Flag marking an id as a relation pair.
pub const PAIR_FLAG: EntityID = 1 << (ENTITY_BITS - 1);
/// Flag marking a pair whose target half is a component id.
pub const TYPE_PAIR_FLAG: EntityID = 1 << (ENTITY_BITS - 2);
/// Mask removing the flag byte from an id.
pub const COMPONENT_MASK: EntityID = !ID_FLAGS_MASK;
/// Largest `first` half a pair can carry without reaching the flag byte.
pub const PAIR_FIRST_MAX: u32 = (1 << (ENTITY_BITS - FLAG_BITS - 32)) - 1;

/// Highest index the entity index can hand out.
pub const INDEX_CAP: IndexID = INDEX_MASK as IndexID;

/// Maximum number of rows per chunk.
pub const CHUNK_CAP: usize = 4096;
/// `log2(CHUNK_CAP)`.
pub const CHUNK_LOG2: u32 = 12;
/// Mask extracting the in-chunk offset from a global row.
pub const CHUNK_MASK: usize = CHUNK_CAP - 1;

const _: [(); 1] = [(); (1usize << CHUNK_LOG2 == CHUNK_CAP) as usize];

/// Ids below this bound are served by the dense tier of a `FastIdLookup`.
pub const FAST_LOOKUP_CAP: usize = 1024;

/// Splits a global row into `(chunk, offset)`.
#[inline]
pub const fn split_row(row: RowID) -> (usize, usize) {
    ((row as usize) >> CHUNK_LOG2, (row as usize) & CHUNK_MASK)
}

/// Joins a chunk index and an in-chunk offset into a global row.
#[inline]
pub const fn join_row(chunk: usize, offset: usize) -> RowID {
    ((chunk << CHUNK_LOG2) | offset) as RowID
}

/// Packs an `(action, target)` relation into a single id.
///
/// ## Panics
/// Debug builds assert that `first` fits below the flag byte.

#[inline]
pub const fn pair(first: u32, second: u32) -> ComponentID {
    debug_assert!(first <= PAIR_FIRST_MAX);
    PAIR_FLAG | ((first as ComponentID) << 32) | (second as ComponentID)
}

/// Packs an `(action, target type)` pair whose target half is a component
/// id instead of an entity index.

#[inline]
pub const fn type_pair(first: u32, second: u32) -> ComponentID {
    pair(first, second) | TYPE_PAIR_FLAG
}

/// Returns `true` if `id` is a packed relation pair.
#[inline]
pub const fn is_pair(id: ComponentID) -> bool {
    id & PAIR_FLAG != 0
}

/// Returns `true` if `id` is a pair over two component types.
#[inline]
pub const fn is_type_pair(id: ComponentID) -> bool {
    is_pair(id) && id & TYPE_PAIR_FLAG != 0
}

/// Decodes the action half of a pair.
#[inline]
pub const fn pair_first(id: ComponentID) -> u32 {
    ((id & COMPONENT_MASK) >> 32) as u32
}

/// Decodes the target half of a pair.
#[inline]
pub const fn pair_second(id: ComponentID) -> u32 {
    id as u32
}

/// Type-erased container for component values.
pub trait DynamicBundle {
    /// Removes and returns the value stored for `component_id`, if present.
    fn take(&mut self, component_id: ComponentID) -> Option<Box<dyn Any + Send>>;

    /// Returns the sorted, deduplicated component set of this bundle.
    fn infos(&self) -> Vec<ComponentInfo>;
}

/// Concrete set of components used to spawn an entity directly into its
/// final archetype.
///
/// Inserting the same type twice keeps the last value.

#[derive(Default)]
pub struct Bundle {
    values: Vec<(ComponentInfo, Option<Box<dyn Any + Send>>)>,
}

impl Bundle {
    /// Creates an empty bundle.
    #[inline]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Inserts a component value, registering its type on first use.
    pub fn insert<T: 'static + Send + Sync>(&mut self, value: T) {
        let info = register_component::<T>();
        let value: Option<Box<dyn Any + Send>> = if info.is_tag() { None } else { Some(Box::new(value)) };
        match self.values.iter_mut().find(|(existing, _)| existing.id == info.id) {
            Some(slot) => slot.1 = value,
            None => self.values.push((info, value)),
        }
    }

    /// Builder-style [`Bundle::insert`].
    #[inline]
    pub fn with<T: 'static + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Number of distinct components in the bundle.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the bundle holds no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DynamicBundle for Bundle {
    fn take(&mut self, component_id: ComponentID) -> Option<Box<dyn Any + Send>> {
        self.values
            .iter_mut()
            .find(|(info, _)| info.id == component_id)
            .and_then(|(_, value)| value.take())
    }

    fn infos(&self) -> Vec<ComponentInfo> {
        let mut infos: Vec<ComponentInfo> = self.values.iter().map(|(info, _)| *info).collect();
        infos.sort_unstable_by_key(|info| info.id);
        infos
    }
}
