//! # Commands
//!
//! Deferred structural mutations and the buffer that replays them.
//!
//! ## Purpose
//! A query iteration holds views into chunk storage that a structural edit
//! (spawn, despawn, attach, detach) could relocate. While the world is inside
//! a deferred scope those edits are recorded as [`Command`] values instead of
//! being applied, and replayed in order once the outermost scope closes.
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur; the
//!   world replays them through the same code path as immediate edits.
//! - A `Create` reserves its entity id at record time so callers can attach
//!   components to it before it exists in storage.
//! - The log sits behind a `parking_lot::Mutex` so a [`Commands`] handle can
//!   record through a shared `&World`, e.g. from inside a parallel visitor.
//!
//! ## Invariants
//! - Commands are replayed in the order they were recorded, including
//!   commands recorded while a replay is running (they join the back of the
//!   same queue).
//! - A command whose entity died before replay is skipped.

use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::engine::component::{
    component_description, register_component, register_pair, register_relation, ComponentInfo,
};
use crate::engine::entity::{Entity, EntityIndex};
use crate::engine::error::{violation, TypeMismatchError};
use crate::engine::types::ComponentID;


/// A deferred structural mutation.
pub enum Command {
    /// Places a reserved entity into the empty archetype.
    Create {
        /// Entity whose id was reserved when the command was recorded.
        entity: Entity,
    },

    /// Destroys an entity; a still-unplaced entity is simply released.
    Destroy {
        /// Entity to remove from the world.
        entity: Entity,
    },

    /// Attaches a component.
    ///
    /// ## Behavior
    /// - If the component is absent the entity moves to the archetype that
    ///   includes it and `value` is stored as a fresh attach.
    /// - If it is present, `value` overwrites it when `replace` is set and
    ///   the command is a no-op otherwise.
    Attach {
        /// Target entity.
        entity: Entity,
        /// Identity of the component.
        component: ComponentInfo,
        /// Value to store; `None` for tags.
        value: Option<Box<dyn Any + Send>>,
        /// Whether an existing value is overwritten.
        replace: bool,
    },

    /// Detaches a component; its value is dropped.
    Detach {
        /// Target entity.
        entity: Entity,
        /// Component to remove.
        component: ComponentID,
    },
}

impl Command {
    /// Entity the command targets.
    #[inline]
    pub fn entity(&self) -> Entity {
        match self {
            Command::Create { entity }
            | Command::Destroy { entity }
            | Command::Attach { entity, .. }
            | Command::Detach { entity, .. } => *entity,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create { entity } => write!(f, "Create({entity})"),
            Command::Destroy { entity } => write!(f, "Destroy({entity})"),
            Command::Attach { entity, component, replace, .. } => {
                write!(f, "Attach({entity}, {component}, replace={replace})")
            }
            Command::Detach { entity, component } => write!(f, "Detach({entity}, {component})"),
        }
    }
}

/// Nesting counter and FIFO log of deferred commands.
///
/// ## Invariants
/// - `depth > 0` while at least one deferred scope is open.
/// - `merging` is set only while the world drains the log; scope changes
///   are ignored during that time.

#[derive(Default)]
pub struct DeferredBuffer {
    depth: u32,
    merging: bool,
    log: Mutex<VecDeque<Command>>,
}

impl DeferredBuffer {
    /// Creates an idle buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    #[inline]
    pub fn depth(&self) -> u32 { self.depth }

    /// Returns `true` while a drain is running.
    #[inline]
    pub fn is_merging(&self) -> bool { self.merging }

    /// Returns `true` if structural edits must be recorded instead of applied.
    #[inline]
    pub fn is_deferring(&self) -> bool {
        self.depth > 0 && !self.merging
    }

    /// Opens a scope. Ignored while merging.
    pub fn begin(&mut self) {
        if self.merging { return; }
        self.depth += 1;
    }

    /// Closes a scope and returns `true` when the outermost scope closed.
    /// Ignored while merging.
    ///
    /// ## Panics
    /// Panics if no scope is open.

    pub fn end(&mut self) -> bool {
        if self.merging { return false; }
        if self.depth == 0 {
            violation("end_deferred called without a matching begin_deferred");
        }
        self.depth -= 1;
        self.depth == 0
    }

    pub(crate) fn set_merging(&mut self, merging: bool) {
        self.merging = merging;
    }

    /// Appends a command to the back of the log.
    #[inline]
    pub fn push(&self, command: Command) {
        self.log.lock().push_back(command);
    }

    /// Removes the oldest command.
    #[inline]
    pub fn pop(&self) -> Option<Command> {
        self.log.lock().pop_front()
    }

    /// Number of pending commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns `true` if no command is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    #[inline]
    pub(crate) fn log(&self) -> &Mutex<VecDeque<Command>> {
        &self.log
    }
}

/// Recording handle for deferred structural edits.
///
/// Every call records a command; nothing is applied until the world replays
/// its log. Obtained from [`crate::World::commands`] or handed to the
/// callback of [`crate::Query::each`].

pub struct Commands<'w> {
    entities: &'w Mutex<EntityIndex>,
    log: &'w Mutex<VecDeque<Command>>,
}

impl<'w> Commands<'w> {
    pub(crate) fn new(entities: &'w Mutex<EntityIndex>, log: &'w Mutex<VecDeque<Command>>) -> Self {
        Self { entities, log }
    }

    #[inline]
    fn record(&self, command: Command) {
        log::trace!("recorded {command:?}");
        self.log.lock().push_back(command);
    }

    /// Reserves a new entity and records its creation.
    ///
    /// ## Panics
    /// Panics if the entity index is exhausted.

    pub fn spawn(&self) -> Entity {
        let reserved = self.entities.lock().reserve();
        let entity = match reserved {
            Ok(entity) => entity,
            Err(e) => violation(e),
        };
        self.record(Command::Create { entity });
        entity
    }

    /// Records the destruction of `entity`.
    pub fn despawn(&self, entity: Entity) {
        self.record(Command::Destroy { entity });
    }

    /// Records attaching `value`, overwriting an existing value.
    pub fn set<T: 'static + Send + Sync>(&self, entity: Entity, value: T) {
        let component = register_component::<T>();
        self.record(Command::Attach { entity, component, value: boxed(component, value), replace: true });
    }

    /// Records attaching `T::default()` unless `T` is already present.
    pub fn add<T: 'static + Send + Sync + Default>(&self, entity: Entity) {
        let component = register_component::<T>();
        self.record(Command::Attach { entity, component, value: boxed(component, T::default()), replace: false });
    }

    /// Records detaching `T`.
    pub fn unset<T: 'static + Send + Sync>(&self, entity: Entity) {
        self.record(Command::Detach { entity, component: register_component::<T>().id });
    }

    /// Records attaching the relation `(R, target)` with `value`.
    pub fn relate<R: 'static + Send + Sync>(&self, entity: Entity, target: Entity, value: R) {
        let component = register_relation::<R>(target);
        self.record(Command::Attach { entity, component, value: boxed(component, value), replace: true });
    }

    /// Records detaching the relation `(R, target)`.
    pub fn unrelate<R: 'static + Send + Sync>(&self, entity: Entity, target: Entity) {
        self.record(Command::Detach { entity, component: register_relation::<R>(target).id });
    }

    /// Records attaching the type-level pair `(A, B)` with `value`.
    ///
    /// ## Panics
    /// Panics if `V` is not the type the pair stores.

    pub fn set_pair<A, B, V>(&self, entity: Entity, value: V)
    where
        A: 'static + Send + Sync,
        B: 'static + Send + Sync,
        V: 'static + Send + Sync,
    {
        let component = register_pair::<A, B>();
        self.record(Command::Attach { entity, component, value: boxed_pair(component, value), replace: true });
    }

    /// Records attaching the pair `(A, B)` with its default value unless it
    /// is already present.

    pub fn add_pair<A, B>(&self, entity: Entity)
    where
        A: 'static + Send + Sync + Default,
        B: 'static + Send + Sync + Default,
    {
        let component = register_pair::<A, B>();
        let value = default_pair_value::<A, B>(component);
        self.record(Command::Attach { entity, component, value, replace: false });
    }

    /// Records detaching the pair `(A, B)`.
    pub fn unset_pair<A: 'static + Send + Sync, B: 'static + Send + Sync>(&self, entity: Entity) {
        self.record(Command::Detach { entity, component: register_pair::<A, B>().id });
    }
}

/// Boxes `value` unless `component` is a tag.
pub(crate) fn boxed<T: 'static + Send + Sync>(component: ComponentInfo, value: T) -> Option<Box<dyn Any + Send>> {
    if component.is_tag() { None } else { Some(Box::new(value)) }
}

/// Checks that the pair `id` stores values of type `V`.
pub(crate) fn check_pair_type<V: 'static>(id: ComponentID) -> Result<(), TypeMismatchError> {
    match component_description(id) {
        Some(desc) if desc.type_id != TypeId::of::<V>() => {
            Err(TypeMismatchError { expected: desc.type_id, actual: TypeId::of::<V>() })
        }
        _ => Ok(()),
    }
}

/// Boxes `value` for the pair `component`.
///
/// ## Panics
/// Panics if the pair carries data of a type other than `V`.

pub(crate) fn boxed_pair<V: 'static + Send + Sync>(component: ComponentInfo, value: V) -> Option<Box<dyn Any + Send>> {
    if component.is_tag() {
        return None;
    }
    if let Err(e) = check_pair_type::<V>(component.id) {
        violation(e);
    }
    Some(Box::new(value))
}

/// Default value of the pair `(A, B)`: `A`'s when `A` carries data,
/// otherwise `B`'s.

pub(crate) fn default_pair_value<A, B>(component: ComponentInfo) -> Option<Box<dyn Any + Send>>
where
    A: 'static + Send + Sync + Default,
    B: 'static + Send + Sync + Default,
{
    if component.is_tag() {
        None
    } else if register_component::<A>().is_tag() {
        Some(Box::new(B::default()))
    } else {
        Some(Box::new(A::default()))
    }
}
