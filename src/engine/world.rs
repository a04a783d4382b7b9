//! # World
//!
//! The public entry point: owns the archetype graph, the entity index, the
//! deferred-command buffer, the world tick and the lifecycle hooks.
//!
//! ## Structural edits
//!
//! `spawn`, `despawn`, `add`, `set`, `unset`, the relation calls (`relate`,
//! `unrelate`) and the type-level pair calls (`set_pair`, `add_pair`,
//! `unset_pair`) take one of two paths:
//!
//! * **Immediate**: outside a deferred scope the edit is applied at once.
//!   Any commands recorded through [`World::commands`] since the last edit
//!   are replayed first, so edits always apply in recording order.
//! * **Deferred**: inside a scope opened with [`World::begin_deferred`] the
//!   edit is recorded. Closing the outermost scope replays the log through
//!   the immediate path.
//!
//! ## Replay
//!
//! While the log is being replayed, `begin_deferred`/`end_deferred` are
//! ignored and edits apply immediately. Commands recorded during the replay
//! (for example by a hook) join the back of the same queue and are drained
//! by the same loop. Commands whose entity died before their turn are
//! skipped.
//!
//! ## Contract violations
//!
//! Using a dead entity, reading a component the entity lacks or treating a
//! tag as data panics through [`violation`]. The `try_*` accessors report
//! the same conditions as [`ECSError`] values instead.
//!
//! ## Ticks
//!
//! Every write stamps the current world tick. The caller advances the tick
//! with [`World::update`] exactly once per logical step.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::engine::archetype::Archetype;
use crate::engine::commands::{
    boxed, boxed_pair, check_pair_type, default_pair_value, Command, Commands, DeferredBuffer,
};
use crate::engine::component::{
    component_id_of, component_name, register_component, register_pair, register_relation,
    ComponentInfo,
};
use crate::engine::entity::{Entity, EntityIndex, EntityRecord};
use crate::engine::error::{
    violation, ECSError, ECSResult, MissingComponentError, StaleEntityError, TagAccessError,
};
use crate::engine::graph::{ArchetypeGraph, ROOT};
use crate::engine::query::QueryBuilder;
use crate::engine::types::{
    is_pair, is_type_pair, pair_first, pair_second, ComponentID, DynamicBundle, Tick,
};


type DestroyHook = Box<dyn Fn(&World, Entity) + Send + Sync>;
type ComponentHook = Box<dyn Fn(&World, Entity, ComponentInfo) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    on_destroy: Vec<DestroyHook>,
    on_set: Vec<ComponentHook>,
    on_unset: Vec<ComponentHook>,
}

/// Initial sizing of a [`World`].
///
/// Both values are hints; the world grows past them on demand.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Archetype slots reserved up front.
    pub archetype_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { entity_capacity: 1024, archetype_capacity: 64 }
    }
}

impl WorldConfig {
    /// Sets the entity capacity hint.
    pub fn with_entity_capacity(mut self, entity_capacity: usize) -> Self {
        self.entity_capacity = entity_capacity;
        self
    }

    /// Sets the archetype capacity hint.
    pub fn with_archetype_capacity(mut self, archetype_capacity: usize) -> Self {
        self.archetype_capacity = archetype_capacity;
        self
    }
}

/// In-memory entity-component store.
///
/// ## Concurrency
/// `World` is `Send + Sync`. Reads and [`Commands`] recording work through
/// `&World`; every structural edit and every write needs `&mut World`.

pub struct World {
    graph: ArchetypeGraph,
    entities: Mutex<EntityIndex>,
    deferred: DeferredBuffer,
    tick: Tick,
    hooks: Hooks,
    config: WorldConfig,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world sized by `config`.
    pub fn with_config(config: WorldConfig) -> Self {
        log::debug!(
            "creating world (entity capacity {}, archetype capacity {})",
            config.entity_capacity, config.archetype_capacity
        );
        Self {
            graph: ArchetypeGraph::with_capacity(config.archetype_capacity),
            entities: Mutex::new(EntityIndex::with_capacity(config.entity_capacity)),
            deferred: DeferredBuffer::new(),
            tick: 0,
            hooks: Hooks::default(),
            config,
        }
    }

    /// Configuration the world was created with.
    #[inline]
    pub fn config(&self) -> &WorldConfig { &self.config }

    /// Archetype graph, read-only.
    #[inline]
    pub fn graph(&self) -> &ArchetypeGraph { &self.graph }

    #[inline]
    pub(crate) fn graph_mut(&mut self) -> &mut ArchetypeGraph { &mut self.graph }

    /// Current world tick.
    #[inline]
    pub fn tick(&self) -> Tick { self.tick }

    /// Advances the world tick by one and returns the new value.
    pub fn update(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }

    /// Number of live entities, reserved ones included.
    pub fn entity_count(&self) -> usize {
        self.entities.lock().len()
    }

    /// Number of live archetypes, the empty one included.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.graph.len()
    }

    /// Returns `true` if `entity` is alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.lock().is_alive(entity)
    }

    /// Storage location of `entity`, or `None` while its creation is still
    /// deferred.
    ///
    /// ## Panics
    /// Panics if `entity` is dead.

    pub fn record(&self, entity: Entity) -> Option<EntityRecord> {
        let index = self.entities.lock();
        if !index.is_alive(entity) {
            drop(index);
            violation(StaleEntityError { entity });
        }
        index.record(entity)
    }

    fn expect_alive(&self, entity: Entity) {
        if !self.is_alive(entity) {
            violation(StaleEntityError { entity });
        }
    }

    fn reserve(&mut self) -> Entity {
        match self.entities.get_mut().reserve() {
            Ok(entity) => entity,
            Err(e) => violation(e),
        }
    }

    /// Starts a query definition.
    #[inline]
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    // ------------------------------------------------------------------
    // hooks
    // ------------------------------------------------------------------

    /// Registers a hook fired right before an entity's storage is reclaimed.
    /// The entity and its components are still readable inside the hook.

    pub fn on_destroy<F>(&mut self, hook: F)
    where
        F: Fn(&World, Entity) + Send + Sync + 'static,
    {
        self.hooks.on_destroy.push(Box::new(hook));
    }

    /// Registers a hook fired after a component is attached or overwritten.
    pub fn on_set<F>(&mut self, hook: F)
    where
        F: Fn(&World, Entity, ComponentInfo) + Send + Sync + 'static,
    {
        self.hooks.on_set.push(Box::new(hook));
    }

    /// Registers a hook fired right before a component is detached.
    pub fn on_unset<F>(&mut self, hook: F)
    where
        F: Fn(&World, Entity, ComponentInfo) + Send + Sync + 'static,
    {
        self.hooks.on_unset.push(Box::new(hook));
    }

    fn fire_set(&self, entity: Entity, component: ComponentInfo) {
        for hook in &self.hooks.on_set {
            hook(self, entity, component);
        }
    }

    fn fire_unset(&self, entity: Entity, component: ComponentInfo) {
        for hook in &self.hooks.on_unset {
            hook(self, entity, component);
        }
    }

    // ------------------------------------------------------------------
    // deferred scope
    // ------------------------------------------------------------------

    /// Opens a deferred scope. Scopes nest.
    pub fn begin_deferred(&mut self) {
        self.deferred.begin();
    }

    /// Closes a deferred scope; closing the outermost one replays the log.
    ///
    /// ## Panics
    /// Panics if no scope is open.

    pub fn end_deferred(&mut self) {
        if self.deferred.end() {
            self.merge();
        }
    }

    /// Returns `true` while at least one deferred scope is open.
    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.deferred.depth() > 0
    }

    /// Number of recorded commands waiting for replay.
    pub fn pending_commands(&self) -> usize {
        self.deferred.len()
    }

    /// Opens a deferred scope that closes when the returned guard drops.
    pub(crate) fn deferred_scope(&mut self) -> DeferredScope<'_> {
        self.begin_deferred();
        DeferredScope { world: self }
    }

    fn abandon_deferred(&mut self) {
        self.deferred.end();
        log::warn!(
            "deferred scope closed while unwinding; {} commands stay pending",
            self.deferred.len()
        );
    }

    /// Replays recorded commands now. Does nothing inside a deferred scope.
    pub fn flush(&mut self) {
        if self.deferred.depth() == 0 {
            self.merge();
        }
    }

    /// Recording handle usable through `&World`.
    pub fn commands(&self) -> Commands<'_> {
        Commands::new(&self.entities, self.deferred.log())
    }

    pub(crate) fn split_for_iteration(&mut self) -> (&mut ArchetypeGraph, Commands<'_>, Tick) {
        (&mut self.graph, Commands::new(&self.entities, self.deferred.log()), self.tick)
    }

    fn merge(&mut self) {
        if self.deferred.is_merging() || self.deferred.is_empty() {
            return;
        }

        self.deferred.set_merging(true);
        let mut applied = 0usize;
        while let Some(command) = self.deferred.pop() {
            log::trace!("replaying {command:?}");
            self.apply(command);
            applied += 1;
        }
        self.deferred.set_merging(false);
        log::debug!("replayed {applied} deferred commands");
    }

    /// Replays pending commands before an immediate edit.
    fn sync(&mut self) {
        if self.deferred.depth() == 0 && !self.deferred.is_merging() {
            self.merge();
        }
    }

    fn apply(&mut self, command: Command) {
        let entity = command.entity();
        if !self.entities.get_mut().is_alive(entity) {
            log::debug!("skipped {command:?}: entity {entity} is no longer alive");
            return;
        }

        match command {
            Command::Create { entity } => {
                if self.entities.get_mut().record(entity).is_none() {
                    self.place(entity);
                }
            }
            Command::Destroy { entity } => self.destroy_now(entity),
            Command::Attach { entity, component, value, replace } => {
                self.attach_now(entity, component, value, replace)
            }
            Command::Detach { entity, component } => self.detach_now(entity, component),
        }
    }

    // ------------------------------------------------------------------
    // immediate structural path
    // ------------------------------------------------------------------

    fn place(&mut self, entity: Entity) -> EntityRecord {
        let tick = self.tick;
        let row = self
            .graph
            .archetype_mut(ROOT)
            .push_row(entity, |_| None, tick)
            .unwrap_or_else(|e| violation(e));
        let record = EntityRecord { archetype: ROOT, row };
        self.entities.get_mut().set_record(entity, record);
        record
    }

    fn destroy_now(&mut self, entity: Entity) {
        for hook in &self.hooks.on_destroy {
            hook(self, entity);
        }

        if let Some(record) = self.entities.get_mut().record(entity) {
            let moved = self
                .graph
                .archetype_mut(record.archetype)
                .remove(record.row)
                .unwrap_or_else(|e| violation(e));
            if let Some(moved) = moved {
                self.entities.get_mut().set_record(moved, record);
            }
        }
        self.entities.get_mut().release(entity);
    }

    fn attach_now(
        &mut self,
        entity: Entity,
        component: ComponentInfo,
        value: Option<Box<dyn std::any::Any + Send>>,
        replace: bool,
    ) {
        let record = match self.entities.get_mut().record(entity) {
            Some(record) => record,
            None => self.place(entity),
        };
        let tick = self.tick;
        let from = record.archetype;

        if self.graph.archetype(from).has(component.id) {
            if !replace {
                return;
            }
            if let Some(value) = value {
                self.graph
                    .archetype_mut(from)
                    .write_dyn(component.id, record.row, value, tick)
                    .unwrap_or_else(|e| violation(e));
            }
            self.fire_set(entity, component);
            return;
        }

        let to = self.graph.find_or_create_with(from, component);
        let (source, destination) = self.graph.pair_mut(from, to);
        let inserted = value.map(|value| (component.id, value));
        let (row, moved) = Archetype::move_row(source, destination, record.row, inserted, tick)
            .unwrap_or_else(|e| violation(e));

        let index = self.entities.get_mut();
        index.set_record(entity, EntityRecord { archetype: to, row });
        if let Some(moved) = moved {
            index.set_record(moved, record);
        }

        self.fire_set(entity, component);
    }

    fn detach_now(&mut self, entity: Entity, component: ComponentID) {
        let Some(record) = self.entities.get_mut().record(entity) else { return };
        let from = record.archetype;
        let Some(info) = self.graph.archetype(from).info(component) else { return };

        self.fire_unset(entity, info);

        let to = self.graph.find_or_create_without(from, component);
        let tick = self.tick;
        let (source, destination) = self.graph.pair_mut(from, to);
        let (row, moved) = Archetype::move_row(source, destination, record.row, None, tick)
            .unwrap_or_else(|e| violation(e));

        let index = self.entities.get_mut();
        index.set_record(entity, EntityRecord { archetype: to, row });
        if let Some(moved) = moved {
            index.set_record(moved, record);
        }
    }

    /// Applies or records an attach, checking liveness first.
    fn attach(
        &mut self,
        entity: Entity,
        component: ComponentInfo,
        value: Option<Box<dyn std::any::Any + Send>>,
        replace: bool,
    ) {
        self.expect_alive(entity);
        if self.deferred.is_deferring() {
            self.deferred.push(Command::Attach { entity, component, value, replace });
            return;
        }
        self.sync();
        self.expect_alive(entity);
        self.attach_now(entity, component, value, replace);
    }

    /// Applies or records a detach, checking liveness first.
    fn detach(&mut self, entity: Entity, component: ComponentID) {
        self.expect_alive(entity);
        if self.deferred.is_deferring() {
            self.deferred.push(Command::Detach { entity, component });
            return;
        }
        self.sync();
        self.expect_alive(entity);
        self.detach_now(entity, component);
    }

    // ------------------------------------------------------------------
    // public structural API
    // ------------------------------------------------------------------

    /// Creates an empty entity.
    ///
    /// Inside a deferred scope the id is returned at once and the entity is
    /// placed when the scope closes.

    pub fn spawn(&mut self) -> Entity {
        if self.deferred.is_deferring() {
            let entity = self.reserve();
            self.deferred.push(Command::Create { entity });
            return entity;
        }
        self.sync();
        let entity = self.reserve();
        self.place(entity);
        entity
    }

    /// Creates an entity directly in the archetype of `bundle`.
    pub fn spawn_bundle<B: DynamicBundle>(&mut self, mut bundle: B) -> Entity {
        let components = bundle.infos();

        if self.deferred.is_deferring() {
            let entity = self.reserve();
            self.deferred.push(Command::Create { entity });
            for component in components {
                let value = bundle.take(component.id);
                self.deferred.push(Command::Attach { entity, component, value, replace: true });
            }
            return entity;
        }

        self.sync();
        let entity = self.reserve();
        let handle = self.graph.find_or_create(&components);
        let tick = self.tick;
        let row = self
            .graph
            .archetype_mut(handle)
            .push_row(entity, |id| bundle.take(id), tick)
            .unwrap_or_else(|e| violation(e));
        self.entities.get_mut().set_record(entity, EntityRecord { archetype: handle, row });

        for component in components {
            self.fire_set(entity, component);
        }
        entity
    }

    /// Destroys `entity`. The destroy hooks run before its storage is
    /// reclaimed.
    ///
    /// ## Panics
    /// Panics if `entity` is dead.

    pub fn despawn(&mut self, entity: Entity) {
        self.expect_alive(entity);
        if self.deferred.is_deferring() {
            self.deferred.push(Command::Destroy { entity });
            return;
        }
        self.sync();
        if !self.entities.get_mut().is_alive(entity) {
            log::debug!("entity {entity} was destroyed by a pending command");
            return;
        }
        self.destroy_now(entity);
    }

    /// Attaches `T::default()` unless `entity` already has `T`.
    pub fn add<T: 'static + Send + Sync + Default>(&mut self, entity: Entity) {
        let component = register_component::<T>();
        self.attach(entity, component, boxed(component, T::default()), false);
    }

    /// Attaches `value`, overwriting an existing `T`.
    pub fn set<T: 'static + Send + Sync>(&mut self, entity: Entity, value: T) {
        let component = register_component::<T>();
        self.attach(entity, component, boxed(component, value), true);
    }

    /// Detaches `T`; does nothing if `entity` lacks it.
    pub fn unset<T: 'static + Send + Sync>(&mut self, entity: Entity) {
        self.detach(entity, register_component::<T>().id);
    }

    /// Attaches the relation `(R, target)` with `value`.
    ///
    /// ## Panics
    /// Panics if `entity` or `target` is dead.

    pub fn relate<R: 'static + Send + Sync>(&mut self, entity: Entity, target: Entity, value: R) {
        self.expect_alive(target);
        let component = register_relation::<R>(target);
        self.attach(entity, component, boxed(component, value), true);
    }

    /// Detaches the relation `(R, target)`.
    pub fn unrelate<R: 'static + Send + Sync>(&mut self, entity: Entity, target: Entity) {
        self.detach(entity, register_relation::<R>(target).id);
    }

    /// Attaches the type-level pair `(A, B)` with `value`, overwriting an
    /// existing value. `V` is `A` when `A` carries data, otherwise `B`.
    ///
    /// ## Panics
    /// Panics if `entity` is dead or `V` is not the type the pair stores.

    pub fn set_pair<A, B, V>(&mut self, entity: Entity, value: V)
    where
        A: 'static + Send + Sync,
        B: 'static + Send + Sync,
        V: 'static + Send + Sync,
    {
        let component = register_pair::<A, B>();
        self.attach(entity, component, boxed_pair(component, value), true);
    }

    /// Attaches the pair `(A, B)` with its default value unless `entity`
    /// already has it.

    pub fn add_pair<A, B>(&mut self, entity: Entity)
    where
        A: 'static + Send + Sync + Default,
        B: 'static + Send + Sync + Default,
    {
        let component = register_pair::<A, B>();
        self.attach(entity, component, default_pair_value::<A, B>(component), false);
    }

    /// Detaches the pair `(A, B)`; does nothing if `entity` lacks it.
    pub fn unset_pair<A: 'static + Send + Sync, B: 'static + Send + Sync>(&mut self, entity: Entity) {
        self.detach(entity, register_pair::<A, B>().id);
    }

    // ------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------

    fn has_id(&self, entity: Entity, id: ComponentID) -> bool {
        match self.record(entity) {
            Some(record) => self.graph.archetype(record.archetype).has(id),
            None => false,
        }
    }

    /// Returns `true` if `entity` has `T`.
    ///
    /// ## Panics
    /// Panics if `entity` is dead.

    pub fn has<T: 'static + Send + Sync>(&self, entity: Entity) -> bool {
        self.has_id(entity, component_id_of::<T>())
    }

    /// Returns `true` if `entity` has the relation `(R, target)`.
    pub fn has_relation<R: 'static + Send + Sync>(&self, entity: Entity, target: Entity) -> bool {
        self.has_id(entity, register_relation::<R>(target).id)
    }

    /// Returns `true` if `entity` has the type-level pair `(A, B)`.
    ///
    /// ## Panics
    /// Panics if `entity` is dead.

    pub fn has_pair<A: 'static + Send + Sync, B: 'static + Send + Sync>(&self, entity: Entity) -> bool {
        self.has_id(entity, register_pair::<A, B>().id)
    }

    /// Returns the value stored under the pair `(A, B)` on `entity`.
    pub fn try_get_pair<A, B, V>(&self, entity: Entity) -> ECSResult<&V>
    where
        A: 'static + Send + Sync,
        B: 'static + Send + Sync,
        V: 'static + Send + Sync,
    {
        let component = register_pair::<A, B>();
        let record = self.locate(entity, component)?;
        check_pair_type::<V>(component.id).map_err(|e| ECSError::Column(e.into()))?;
        self.graph
            .archetype(record.archetype)
            .get::<V>(component.id, record.row)
            .ok_or_else(|| missing(entity, component.id))
    }

    /// Returns the value stored under the pair `(A, B)` on `entity`.
    ///
    /// ## Panics
    /// Panics if `entity` is dead or lacks the pair, the pair is a tag, or
    /// `V` is not the type the pair stores.

    pub fn get_pair<A, B, V>(&self, entity: Entity) -> &V
    where
        A: 'static + Send + Sync,
        B: 'static + Send + Sync,
        V: 'static + Send + Sync,
    {
        self.try_get_pair::<A, B, V>(entity).unwrap_or_else(|e| violation(e))
    }

    fn locate(&self, entity: Entity, component: ComponentInfo) -> ECSResult<EntityRecord> {
        if component.is_tag() {
            return Err(TagAccessError { component_id: component.id, name: component_name(component.id) }.into());
        }
        let record = {
            let index = self.entities.lock();
            if !index.is_alive(entity) {
                return Err(StaleEntityError { entity }.into());
            }
            index.record(entity)
        };
        record.ok_or_else(|| missing(entity, component.id))
    }

    /// Returns `entity`'s `T`.
    pub fn try_get<T: 'static + Send + Sync>(&self, entity: Entity) -> ECSResult<&T> {
        let component = register_component::<T>();
        let record = self.locate(entity, component)?;
        self.graph
            .archetype(record.archetype)
            .get::<T>(component.id, record.row)
            .ok_or_else(|| missing(entity, component.id))
    }

    /// Returns `entity`'s `T` mutably and stamps it as changed.
    pub fn try_get_mut<T: 'static + Send + Sync>(&mut self, entity: Entity) -> ECSResult<&mut T> {
        let component = register_component::<T>();
        let record = self.locate(entity, component)?;
        let tick = self.tick;
        self.graph
            .archetype_mut(record.archetype)
            .get_mut::<T>(component.id, record.row, tick)
            .ok_or_else(|| missing(entity, component.id))
    }

    /// Returns `entity`'s `T`.
    ///
    /// ## Panics
    /// Panics if `entity` is dead, lacks `T`, or `T` is a tag.

    pub fn get<T: 'static + Send + Sync>(&self, entity: Entity) -> &T {
        self.try_get::<T>(entity).unwrap_or_else(|e| violation(e))
    }

    /// Returns `entity`'s `T` mutably and stamps it as changed.
    ///
    /// ## Panics
    /// Panics if `entity` is dead, lacks `T`, or `T` is a tag.

    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: Entity) -> &mut T {
        self.try_get_mut::<T>(entity).unwrap_or_else(|e| violation(e))
    }

    /// Returns the value of the relation `(R, target)` on `entity`.
    ///
    /// ## Panics
    /// Panics if `entity` is dead or lacks the relation, or `R` is a tag.

    pub fn get_relation<R: 'static + Send + Sync>(&self, entity: Entity, target: Entity) -> &R {
        let component = register_relation::<R>(target);
        let found = self.locate(entity, component).and_then(|record| {
            self.graph
                .archetype(record.archetype)
                .get::<R>(component.id, record.row)
                .ok_or_else(|| missing(entity, component.id))
        });
        found.unwrap_or_else(|e| violation(e))
    }

    /// Live targets of every `R` relation on `entity`. Type-level pairs
    /// `(R, B)` are not entity relations and are skipped.
    pub fn targets<R: 'static + Send + Sync>(&self, entity: Entity) -> Vec<Entity> {
        let action = component_id_of::<R>() as u32;
        let Some(record) = self.record(entity) else { return Vec::new() };
        let index = self.entities.lock();
        self.graph
            .archetype(record.archetype)
            .component_ids()
            .iter()
            .filter(|&&id| is_pair(id) && !is_type_pair(id) && pair_first(id) == action)
            .filter_map(|&id| index.alive_at(pair_second(id)))
            .collect()
    }

    /// Removes archetypes that hold no entities and lead to none. Returns
    /// the number removed.

    pub fn compact(&mut self) -> usize {
        let removed = self.graph.remove_empty_archetypes();
        log::debug!("compaction removed {removed} archetypes");
        removed
    }
}

/// Deferred scope that closes when dropped.
///
/// Dropped normally, it closes like [`World::end_deferred`]. Dropped while
/// unwinding, it closes without replaying and the recorded commands stay
/// pending until the next flush or immediate edit.

pub(crate) struct DeferredScope<'w> {
    world: &'w mut World,
}

impl Deref for DeferredScope<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for DeferredScope<'_> {
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}

impl Drop for DeferredScope<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.world.abandon_deferred();
        } else {
            self.world.end_deferred();
        }
    }
}

fn missing(entity: Entity, component_id: ComponentID) -> ECSError {
    MissingComponentError { entity, component_id, name: component_name(component_id) }.into()
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("entities", &self.entity_count())
            .field("archetypes", &self.graph.len())
            .field("deferred_depth", &self.deferred.depth())
            .field("pending_commands", &self.deferred.len())
            .finish()
    }
}
