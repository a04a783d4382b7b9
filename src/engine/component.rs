//! # Component Registry
//!
//! This module provides the process-global registry that gives every
//! component type, tag and relation pair a canonical numeric identity on
//! first use, and exposes the type-erased column factories archetypes use to
//! allocate storage.
//!
//! ## Purpose
//! The registry decouples type information (`TypeId`, name, size, alignment,
//! drop glue) from runtime storage, so archetypes can hold heterogeneous
//! columns behind [`ErasedColumn`] and queries can be compiled from plain ids.
//!
//! ## Design
//! - Ids are allocated sequentially from 1 and memoized by `TypeId`; asking
//!   for the identity of a type registers it.
//! - A zero-size type is a *tag*: it has size 0 and no column factory.
//! - A relation pair is registered under the packed id of its halves. Its
//!   data comes from the first half when that half carries data, otherwise
//!   from the second half, otherwise the pair is a tag.
//! - Entries live in a [`FastIdLookup`], so plain component ids hit the dense
//!   tier and pairs the hash tier.
//!
//! ## Invariants
//! - An id's size never changes once recorded; a conflicting registration is
//!   a contract violation.
//! - `factory.is_some()` if and only if `size > 0`.
//!
//! ## Concurrency
//! The registry sits behind a `parking_lot::RwLock`: lookups share the lock,
//! first-time registrations take it exclusively.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    fmt,
    mem::{align_of, needs_drop, size_of},
    sync::OnceLock,
};

use parking_lot::RwLock;

use crate::engine::entity::Entity;
use crate::engine::error::{
    violation, SizeConflictError, TagAccessError, UnregisteredComponentError,
};
use crate::engine::lookup::FastIdLookup;
use crate::engine::storage::{Column, ErasedColumn};
use crate::engine::types::{pair, type_pair, ComponentID, PAIR_FIRST_MAX};


/// Factory constructing an empty column for one component id.
pub type ColumnFactory = fn() -> Box<dyn ErasedColumn>;

fn new_column<T: 'static + Send + Sync>() -> Box<dyn ErasedColumn> {
    Box::new(Column::<T>::new())
}

/// Identity of a component as the storage layer sees it.
///
/// ## Fields
/// - `id`: Registry-assigned id (possibly a packed pair).
/// - `size`: Byte size of one value; `0` marks a tag with no storage.
/// - `needs_special_storage`: `true` when values own resources and must be
///   dropped rather than discarded bitwise.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentInfo {
    /// Runtime identifier assigned by the registry.
    pub id: ComponentID,

    /// Size of one value in bytes; `0` for tags.
    pub size: usize,

    /// Whether values carry drop glue.
    pub needs_special_storage: bool,
}

impl ComponentInfo {
    /// Returns `true` if this component is a zero-size tag.
    #[inline]
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

impl fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.size)?;
        if self.needs_special_storage {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// Describes a registered component for diagnostics and tooling.
///
/// `ComponentDesc` is `Copy` and can be cloned freely out of the registry.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ComponentDesc {
    /// Storage identity.
    pub info: ComponentInfo,

    /// Rust type name.
    pub name: &'static str,

    /// `TypeId` of the type whose values are stored under this id.
    pub type_id: TypeId,

    /// Alignment of one value.
    pub align: usize,
}

impl ComponentDesc {
    /// Describes type `T` under `id`.
    #[inline]
    pub fn of<T: 'static>(id: ComponentID) -> Self {
        Self {
            info: ComponentInfo {
                id,
                size: size_of::<T>(),
                needs_special_storage: needs_drop::<T>(),
            },
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            align: align_of::<T>(),
        }
    }

    /// Returns a copy of this descriptor moved to another id and name.
    #[inline]
    fn renamed(mut self, id: ComponentID, name: &'static str) -> Self {
        self.info.id = id;
        self.name = name;
        self
    }

    /// Returns `true` if this descriptor stores values of type `T`.
    #[inline]
    pub fn matches_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComponentDesc {{ id: {}, name: {}, size: {}, align: {} }}",
            self.info.id, self.name, self.info.size, self.align
        )
    }
}

#[derive(Clone, Copy)]
struct ComponentEntry {
    desc: ComponentDesc,
    factory: Option<ColumnFactory>,
}

/// Global mapping between Rust types and component ids.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching entry in `by_id`.
/// - `next_id` never exceeds [`PAIR_FIRST_MAX`], so every plain id can be the
///   action half of a pair.

pub struct ComponentRegistry {
    next_id: ComponentID,
    by_type: HashMap<TypeId, ComponentID>,
    by_id: FastIdLookup<ComponentEntry>,
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn component_registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(ComponentRegistry {
            next_id: 1,
            by_type: HashMap::new(),
            by_id: FastIdLookup::new(),
        })
    })
}

impl ComponentRegistry {

    /// Allocates a new id.
    ///
    /// ## Panics
    /// Panics once the id space for pair actions is exhausted.

    fn alloc_id(&mut self) -> ComponentID {
        let id = self.next_id;
        assert!(id <= PAIR_FIRST_MAX as ComponentID, "exceeded component id capacity");
        self.next_id += 1;
        id
    }

    fn insert_entry(&mut self, entry: ComponentEntry) -> ComponentInfo {
        let info = entry.desc.info;
        if let Some(existing) = self.by_id.get(info.id) {
            if existing.desc.info.size != info.size {
                violation(SizeConflictError {
                    component_id: info.id,
                    registered: existing.desc.info.size,
                    requested: info.size,
                });
            }
            return existing.desc.info;
        }
        self.by_id.insert(info.id, entry);
        info
    }

    /// Registers `T` and returns its identity; returns the memoized identity
    /// if `T` is already known.

    pub fn register<T: 'static + Send + Sync>(&mut self) -> ComponentInfo {
        let type_id = TypeId::of::<T>();
        if let Some(entry) = self.by_type.get(&type_id).and_then(|&id| self.by_id.get(id)) {
            return entry.desc.info;
        }

        let id = self.alloc_id();
        let desc = ComponentDesc::of::<T>(id);
        let factory = if desc.info.is_tag() { None } else { Some(new_column::<T> as ColumnFactory) };
        self.by_type.insert(type_id, id);
        log::trace!("registered component {} as {}", desc.name, desc.info);
        self.insert_entry(ComponentEntry { desc, factory })
    }

    /// Returns the identity stored under `id`.
    pub fn info(&self, id: ComponentID) -> Option<ComponentInfo> {
        self.by_id.get(id).map(|entry| entry.desc.info)
    }

    /// Returns the descriptor stored under `id`.
    pub fn description(&self, id: ComponentID) -> Option<ComponentDesc> {
        self.by_id.get(id).map(|entry| entry.desc)
    }

    /// Number of registered ids, pairs included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Registers component type `T` in the global registry and returns its
/// identity.

pub fn register_component<T: 'static + Send + Sync>() -> ComponentInfo {
    {
        let registry = component_registry().read();
        if let Some(info) = registry.by_type.get(&TypeId::of::<T>()).and_then(|&id| registry.info(id)) {
            return info;
        }
    }
    component_registry().write().register::<T>()
}

/// Returns the id of `T`, registering it on first use.
#[inline]
pub fn component_id_of<T: 'static + Send + Sync>() -> ComponentID {
    register_component::<T>().id
}

/// Returns the identity stored under `id`.
///
/// ## Panics
/// Panics if `id` was never registered.

pub fn component_info(id: ComponentID) -> ComponentInfo {
    match try_component_info(id) {
        Some(info) => info,
        None => violation(UnregisteredComponentError { component_id: id }),
    }
}

/// Returns the identity stored under `id`, if registered.
pub fn try_component_info(id: ComponentID) -> Option<ComponentInfo> {
    component_registry().read().info(id)
}

/// Returns a copy of the descriptor stored under `id`, if registered.
pub fn component_description(id: ComponentID) -> Option<ComponentDesc> {
    component_registry().read().description(id)
}

/// Returns the diagnostic name of `id`, or `"?"` when unknown.
pub fn component_name(id: ComponentID) -> &'static str {
    component_description(id).map(|desc| desc.name).unwrap_or("?")
}

/// Registers the type-level pair `(A, B)` and returns its identity.
///
/// ## Behavior
/// Values stored under the pair are of type `A` when `A` carries data,
/// otherwise of type `B`; when both are tags the pair is a tag. The id
/// carries [`TYPE_PAIR_FLAG`](crate::engine::types::TYPE_PAIR_FLAG), so it
/// never collides with an entity relation `(A, target)`.

pub fn register_pair<A: 'static + Send + Sync, B: 'static + Send + Sync>() -> ComponentInfo {
    let first = register_component::<A>();
    let second = register_component::<B>();
    let id = type_pair(first.id as u32, second.id as u32);

    let mut registry = component_registry().write();
    if let Some(info) = registry.info(id) {
        return info;
    }
    let source = if !first.is_tag() { first.id } else { second.id };
    let entry = registry.by_id.get(source).copied();
    match entry {
        Some(entry) => registry.insert_entry(ComponentEntry {
            desc: entry.desc.renamed(id, type_name::<(A, B)>()),
            factory: entry.factory,
        }),
        None => violation(UnregisteredComponentError { component_id: source }),
    }
}

/// Registers the relation `(R, target)` pointing at an entity and returns
/// its identity. Values stored under it are of type `R`.
///
/// Only the target's index is packed; its generation is not part of the id.

pub fn register_relation<R: 'static + Send + Sync>(target: Entity) -> ComponentInfo {
    let action = register_component::<R>();
    let id = pair(action.id as u32, target.index());

    let mut registry = component_registry().write();
    if let Some(info) = registry.info(id) {
        if info.size != action.size {
            violation(SizeConflictError { component_id: id, registered: info.size, requested: action.size });
        }
        return info;
    }
    let entry = registry.by_id.get(action.id).copied();
    match entry {
        Some(entry) => registry.insert_entry(ComponentEntry {
            desc: entry.desc.renamed(id, type_name::<R>()),
            factory: entry.factory,
        }),
        None => violation(UnregisteredComponentError { component_id: action.id }),
    }
}

/// Returns the column factory registered for `id`.
///
/// ## Panics
/// Panics if `id` is unknown or is a tag.

pub fn column_factory(id: ComponentID) -> ColumnFactory {
    let entry = component_registry().read().by_id.get(id).copied();
    match entry {
        Some(ComponentEntry { factory: Some(factory), .. }) => factory,
        Some(ComponentEntry { desc, factory: None }) => {
            violation(TagAccessError { component_id: id, name: desc.name })
        }
        None => violation(UnregisteredComponentError { component_id: id }),
    }
}
