//! # Archetypes
//!
//! An archetype owns every entity whose component set is exactly its type,
//! stored column-major in fixed-capacity [`Chunk`]s.
//!
//! ## Layout
//!
//! * `components` is the strictly id-sorted type of the archetype, tags
//!   included.
//! * `stored` is the sorted subset of ids that carry data. Stored id `i`
//!   lives in column `i` of every chunk.
//! * A global row `r` lives in chunk `r >> CHUNK_LOG2` at offset
//!   `r & CHUNK_MASK`. Only the last chunk may be partially filled.
//!
//! ## Row movement
//!
//! Rows leave an archetype by swap-remove: the archetype's last row fills the
//! hole, so storage stays dense and the caller patches exactly one entity
//! record. A structural change moves a row between two archetypes with a
//! single merge-walk over both sorted stored-id arrays:
//!
//! * ids in both archetypes move value and ticks to the destination,
//! * ids only in the source are dropped,
//! * ids only in the destination receive the value being attached.
//!
//! ## Invariants
//!
//! * Every column in every chunk has exactly as many rows as the chunk's
//!   entity array.
//! * `count` equals the sum of chunk counts; no trailing chunk is empty.
//! * Any inconsistency detected while moving rows is reported as a
//!   [`MoveError`]; the world treats it as fatal.

use std::any::Any;
use std::fmt;

use crate::engine::component::{column_factory, ColumnFactory, ComponentInfo};
use crate::engine::entity::Entity;
use crate::engine::error::MoveError;
use crate::engine::lookup::FastIdLookup;
use crate::engine::storage::{Chunk, Column};
use crate::engine::types::{
    join_row, split_row, ArchetypeHandle, ArchetypeID, ComponentID, RowID, Tick,
};


const HASH_SEED: u64 = 0xcbf2_9ce4_8422_2325;
const HASH_PRIME: u64 = 0x0000_0100_0000_01b3;

#[inline]
fn hash_step(hash: u64, id: ComponentID) -> u64 {
    (hash ^ id).wrapping_mul(HASH_PRIME).rotate_left(31)
}

/// Hashes a sorted id sequence into an [`ArchetypeID`].
///
/// The combine is order-sensitive, so callers must feed ids in ascending
/// order for equal sets to hash equally.

pub fn hash_ids<I: IntoIterator<Item = ComponentID>>(ids: I) -> ArchetypeID {
    ids.into_iter().fold(HASH_SEED, hash_step)
}

/// Hash of `ids` with `extra` merged in at its sorted position.
pub fn hash_with(ids: &[ComponentID], extra: ComponentID) -> ArchetypeID {
    let split = ids.partition_point(|&id| id < extra);
    let mut hash = hash_ids(ids[..split].iter().copied());
    if ids.get(split) != Some(&extra) {
        hash = hash_step(hash, extra);
    }
    ids[split..].iter().copied().fold(hash, hash_step)
}

/// Hash of `ids` with `removed` left out.
pub fn hash_without(ids: &[ComponentID], removed: ComponentID) -> ArchetypeID {
    hash_ids(ids.iter().copied().filter(|&id| id != removed))
}

/// A single-component transition to a neighbouring archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    /// The component that differs.
    pub component: ComponentID,
    /// The neighbour reached by adding or removing `component`.
    pub archetype: ArchetypeHandle,
}

/// One column-level action of a row move.
#[derive(Clone, Copy)]
enum MoveStep {
    Shared { source: usize, destination: usize },
    SourceOnly { source: usize },
    DestinationOnly { destination: usize },
}

/// Returns the chunk at `index` and, when it is not the last one, the last
/// chunk as a second disjoint borrow.

fn chunk_and_tail(chunks: &mut [Chunk], index: usize) -> (&mut Chunk, Option<&mut Chunk>) {
    let last = chunks.len() - 1;
    if index == last {
        (&mut chunks[index], None)
    } else {
        let (low, high) = chunks.split_at_mut(last);
        (&mut low[index], Some(&mut high[0]))
    }
}

/// Storage bucket for entities sharing one exact component set.
///
/// ## Purpose
/// Owns the chunked columns of its type and the edge lists that make a
/// single-component transition a one-hop lookup.
///
/// ## Invariants
/// - `components` and `stored` are strictly sorted by id.
/// - `column_lookup` maps each stored id to its column index.
/// - `id == hash_ids(components ids)`.

pub struct Archetype {
    id: ArchetypeID,
    handle: ArchetypeHandle,
    components: Vec<ComponentInfo>,
    ids: Vec<ComponentID>,
    stored: Vec<ComponentID>,
    component_lookup: FastIdLookup<usize>,
    column_lookup: FastIdLookup<usize>,
    factories: Vec<ColumnFactory>,
    chunks: Vec<Chunk>,
    count: usize,
    pub(crate) add_edges: Vec<Edge>,
    pub(crate) remove_edges: Vec<Edge>,
}

impl Archetype {

    /// Creates an empty archetype of the given type.
    ///
    /// ## Panics
    /// Debug builds assert that `components` is strictly sorted.

    pub fn new(handle: ArchetypeHandle, components: Vec<ComponentInfo>) -> Self {
        debug_assert!(
            components.windows(2).all(|w| w[0].id < w[1].id),
            "archetype type must be strictly sorted"
        );

        let ids: Vec<ComponentID> = components.iter().map(|info| info.id).collect();
        let mut component_lookup = FastIdLookup::new();
        let mut column_lookup = FastIdLookup::new();
        let mut stored = Vec::new();
        let mut factories = Vec::new();

        for (slot, info) in components.iter().enumerate() {
            component_lookup.insert(info.id, slot);
            if !info.is_tag() {
                column_lookup.insert(info.id, stored.len());
                stored.push(info.id);
                factories.push(column_factory(info.id));
            }
        }

        Self {
            id: hash_ids(ids.iter().copied()),
            handle,
            components,
            ids,
            stored,
            component_lookup,
            column_lookup,
            factories,
            chunks: Vec::new(),
            count: 0,
            add_edges: Vec::new(),
            remove_edges: Vec::new(),
        }
    }

    /// Canonical hash of this archetype's type.
    #[inline]
    pub fn id(&self) -> ArchetypeID { self.id }

    /// Arena slot of this archetype.
    #[inline]
    pub fn handle(&self) -> ArchetypeHandle { self.handle }

    /// Sorted type of the archetype.
    #[inline]
    pub fn components(&self) -> &[ComponentInfo] { &self.components }

    /// Sorted component ids of the archetype.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentID] { &self.ids }

    /// Sorted ids that own a column.
    #[inline]
    pub fn stored_ids(&self) -> &[ComponentID] { &self.stored }

    /// Number of live rows.
    #[inline]
    pub fn len(&self) -> usize { self.count }

    /// Returns `true` if the archetype holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool { self.count == 0 }

    /// Number of allocated chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize { self.chunks.len() }

    /// All chunks, in row order.
    #[inline]
    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    /// All chunks mutably, in row order.
    #[inline]
    pub fn chunks_mut(&mut self) -> &mut [Chunk] { &mut self.chunks }

    /// Returns `true` if `id` is part of this archetype's type.
    #[inline]
    pub fn has(&self, id: ComponentID) -> bool {
        self.component_lookup.contains(id)
    }

    /// Returns the identity of `id` within this archetype's type.
    #[inline]
    pub fn info(&self, id: ComponentID) -> Option<ComponentInfo> {
        self.component_lookup.get(id).map(|&slot| self.components[slot])
    }

    /// Column index of a stored component, or `None` for tags and absent ids.
    #[inline]
    pub fn column_index(&self, id: ComponentID) -> Option<usize> {
        self.column_lookup.get(id).copied()
    }

    /// Outgoing add-edges.
    #[inline]
    pub fn add_edges(&self) -> &[Edge] { &self.add_edges }

    /// Outgoing remove-edges.
    #[inline]
    pub fn remove_edges(&self) -> &[Edge] { &self.remove_edges }

    /// Neighbour reached by adding `id`, if the edge exists.
    #[inline]
    pub fn add_edge(&self, id: ComponentID) -> Option<ArchetypeHandle> {
        self.add_edges.iter().find(|edge| edge.component == id).map(|edge| edge.archetype)
    }

    /// Neighbour reached by removing `id`, if the edge exists.
    #[inline]
    pub fn remove_edge(&self, id: ComponentID) -> Option<ArchetypeHandle> {
        self.remove_edges.iter().find(|edge| edge.component == id).map(|edge| edge.archetype)
    }

    pub(crate) fn set_add_edge(&mut self, component: ComponentID, archetype: ArchetypeHandle) {
        set_edge(&mut self.add_edges, Edge { component, archetype });
    }

    pub(crate) fn set_remove_edge(&mut self, component: ComponentID, archetype: ArchetypeHandle) {
        set_edge(&mut self.remove_edges, Edge { component, archetype });
    }

    /// Drops every edge whose target fails `keep`.
    pub(crate) fn retain_edges(&mut self, mut keep: impl FnMut(ArchetypeHandle) -> bool) {
        self.add_edges.retain(|edge| keep(edge.archetype));
        self.remove_edges.retain(|edge| keep(edge.archetype));
    }

    /// Returns `true` if this archetype's type equals `other`'s type plus `id`.
    pub fn is_superset_by(&self, other: &Archetype, id: ComponentID) -> bool {
        self.ids.len() == other.ids.len() + 1
            && self.has(id)
            && !other.has(id)
            && other.ids.iter().all(|&other_id| self.has(other_id))
    }

    /// Entity at global row `row`.
    #[inline]
    pub fn entity_at(&self, row: RowID) -> Option<Entity> {
        let (chunk, offset) = split_row(row);
        self.chunks.get(chunk)?.entities().get(offset).copied()
    }

    fn ensure_tail(&mut self) -> usize {
        if self.chunks.last().map_or(true, Chunk::is_full) {
            self.chunks.push(Chunk::new(&self.factories));
        }
        self.chunks.len() - 1
    }

    fn trim_tail(&mut self) {
        if self.chunks.last().map_or(false, Chunk::is_empty) {
            self.chunks.pop();
        }
    }

    fn check_row(&self, row: RowID) -> Result<(usize, usize), MoveError> {
        if row as usize >= self.count {
            return Err(MoveError::RowOutOfBounds { row, count: self.count });
        }
        Ok(split_row(row))
    }

    /// Appends a row for `entity`, filling stored columns from `values`.
    ///
    /// ## Behavior
    /// Every stored column needs a value; all values are taken from
    /// `values` before any storage is touched, so a missing value leaves the
    /// archetype unchanged.

    pub fn push_row(
        &mut self,
        entity: Entity,
        mut values: impl FnMut(ComponentID) -> Option<Box<dyn Any + Send>>,
        tick: Tick,
    ) -> Result<RowID, MoveError> {
        let mut taken = Vec::with_capacity(self.stored.len());
        for &component_id in &self.stored {
            match values(component_id) {
                Some(value) => taken.push(value),
                None => return Err(MoveError::MissingInsertedValue { component_id }),
            }
        }

        let chunk_index = self.ensure_tail();
        let chunk = &mut self.chunks[chunk_index];
        for (column, value) in taken.into_iter().enumerate() {
            chunk
                .column_dyn_mut(column)
                .push_dyn(value, tick)
                .map_err(|source_error| MoveError::Column {
                    component_id: self.stored[column],
                    source_error,
                })?;
        }
        let offset = chunk.push_entity(entity);
        self.count += 1;
        Ok(join_row(chunk_index, offset))
    }

    /// Swap-removes `row`, dropping its values.
    ///
    /// Returns the entity that now occupies `row`, or `None` when `row` was
    /// the last row.

    pub fn remove(&mut self, row: RowID) -> Result<Option<Entity>, MoveError> {
        let (chunk_index, offset) = self.check_row(row)?;
        let stored = &self.stored;
        let (chunk, mut tail) = chunk_and_tail(&mut self.chunks, chunk_index);

        for (column, &component_id) in stored.iter().enumerate() {
            let tail_column = tail.as_deref_mut().map(|t| t.column_dyn_mut(column));
            chunk
                .column_dyn_mut(column)
                .take_row(offset, tail_column, None)
                .map_err(|source_error| MoveError::Column { component_id, source_error })?;
        }
        let moved = chunk.take_entity(offset, tail);

        self.count -= 1;
        self.trim_tail();
        Ok(moved)
    }

    fn plan_move(source: &[ComponentID], destination: &[ComponentID]) -> Vec<MoveStep> {
        let mut steps = Vec::with_capacity(source.len().max(destination.len()));
        let (mut i, mut j) = (0, 0);
        while i < source.len() || j < destination.len() {
            match (source.get(i), destination.get(j)) {
                (Some(a), Some(b)) if a == b => {
                    steps.push(MoveStep::Shared { source: i, destination: j });
                    i += 1;
                    j += 1;
                }
                (Some(a), Some(b)) if a < b => {
                    steps.push(MoveStep::SourceOnly { source: i });
                    i += 1;
                }
                (Some(_), None) => {
                    steps.push(MoveStep::SourceOnly { source: i });
                    i += 1;
                }
                _ => {
                    steps.push(MoveStep::DestinationOnly { destination: j });
                    j += 1;
                }
            }
        }
        steps
    }

    /// Moves `row` of `source` into `destination`.
    ///
    /// ## Behavior
    /// 1. Plans the move by merge-walking both sorted stored-id arrays.
    /// 2. Checks that every destination-only column is covered by
    ///    `inserted`; nothing is touched if it is not.
    /// 3. Moves shared values with their ticks, drops source-only values and
    ///    pushes the inserted value as a fresh attach at `tick`.
    /// 4. Swap-removes the entity id from the source and appends it to the
    ///    destination.
    ///
    /// Returns the entity's new row and the entity that now occupies `row`
    /// in `source`, if any.
    ///
    /// ## Errors
    /// Any [`MoveError`] indicates broken storage invariants.

    pub fn move_row(
        source: &mut Archetype,
        destination: &mut Archetype,
        row: RowID,
        inserted: Option<(ComponentID, Box<dyn Any + Send>)>,
        tick: Tick,
    ) -> Result<(RowID, Option<Entity>), MoveError> {
        let (chunk_index, offset) = source.check_row(row)?;
        let steps = Self::plan_move(&source.stored, &destination.stored);

        let mut inserted = inserted;
        for step in &steps {
            if let MoveStep::DestinationOnly { destination: column } = *step {
                let component_id = destination.stored[column];
                if inserted.as_ref().map(|(id, _)| *id) != Some(component_id) {
                    return Err(MoveError::MissingInsertedValue { component_id });
                }
            }
        }

        let entity = source.chunks[chunk_index].entities()[offset];
        let destination_chunk = destination.ensure_tail();
        let destination_row = destination.count as RowID;

        let source_stored = &source.stored;
        let destination_stored = &destination.stored;
        let (chunk, mut tail) = chunk_and_tail(&mut source.chunks, chunk_index);
        let target = &mut destination.chunks[destination_chunk];

        for step in steps {
            match step {
                MoveStep::Shared { source: from, destination: to } => {
                    let tail_column = tail.as_deref_mut().map(|t| t.column_dyn_mut(from));
                    chunk
                        .column_dyn_mut(from)
                        .take_row(offset, tail_column, Some(target.column_dyn_mut(to)))
                        .map_err(|source_error| MoveError::Column {
                            component_id: source_stored[from],
                            source_error,
                        })?;
                }
                MoveStep::SourceOnly { source: from } => {
                    let tail_column = tail.as_deref_mut().map(|t| t.column_dyn_mut(from));
                    chunk
                        .column_dyn_mut(from)
                        .take_row(offset, tail_column, None)
                        .map_err(|source_error| MoveError::Column {
                            component_id: source_stored[from],
                            source_error,
                        })?;
                }
                MoveStep::DestinationOnly { destination: to } => {
                    let component_id = destination_stored[to];
                    let value = match inserted.take() {
                        Some((_, value)) => value,
                        None => return Err(MoveError::MissingInsertedValue { component_id }),
                    };
                    target
                        .column_dyn_mut(to)
                        .push_dyn(value, tick)
                        .map_err(|source_error| MoveError::Column { component_id, source_error })?;
                }
            }
        }

        target.push_entity(entity);
        let moved = chunk.take_entity(offset, tail);

        source.count -= 1;
        destination.count += 1;
        source.trim_tail();

        match destination.entity_at(destination_row) {
            Some(found) if found == entity => Ok((destination_row, moved)),
            found => Err(MoveError::RowMismatch {
                expected: entity,
                found: found.unwrap_or(Entity(0)),
            }),
        }
    }

    /// Typed value of stored component `id` at `row`.
    #[inline]
    pub fn get<T: 'static>(&self, id: ComponentID, row: RowID) -> Option<&T> {
        let column = self.column_index(id)?;
        let (chunk, offset) = split_row(row);
        self.chunks.get(chunk)?.column::<T>(column)?.get(offset)
    }

    /// Typed value of stored component `id` at `row`, mutably. The changed
    /// tick of the row is stamped with `tick`.

    pub fn get_mut<T: 'static>(&mut self, id: ComponentID, row: RowID, tick: Tick) -> Option<&mut T> {
        let column = self.column_index(id)?;
        let (chunk, offset) = split_row(row);
        let column: &mut Column<T> = self.chunks.get_mut(chunk)?.column_mut::<T>(column)?;
        if offset >= column.len() { return None; }
        let (values, changed) = column.values_and_changed_mut();
        changed[offset] = tick;
        Some(&mut values[offset])
    }

    /// Overwrites stored component `id` at `row` with a boxed value.
    pub fn write_dyn(
        &mut self,
        id: ComponentID,
        row: RowID,
        value: Box<dyn Any + Send>,
        tick: Tick,
    ) -> Result<(), MoveError> {
        let (chunk, offset) = self.check_row(row)?;
        let column = match self.column_index(id) {
            Some(column) => column,
            None => return Err(MoveError::MissingInsertedValue { component_id: id }),
        };
        self.chunks[chunk]
            .column_dyn_mut(column)
            .write_dyn(offset, value, tick)
            .map_err(|source_error| MoveError::Column { component_id: id, source_error })
    }

    /// `(added, changed)` ticks of stored component `id` at `row`.
    pub fn ticks(&self, id: ComponentID, row: RowID) -> Option<(Tick, Tick)> {
        let column = self.column_index(id)?;
        let (chunk, offset) = split_row(row);
        let column = self.chunks.get(chunk)?.column_dyn(column);
        Some((*column.added_ticks().get(offset)?, *column.changed_ticks().get(offset)?))
    }
}

fn set_edge(edges: &mut Vec<Edge>, edge: Edge) {
    match edges.iter_mut().find(|existing| existing.component == edge.component) {
        Some(existing) => existing.archetype = edge.archetype,
        None => edges.push(edge),
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [", self.handle)?;
        for (i, info) in self.components.iter().enumerate() {
            if i > 0 { f.write_str(", ")?; }
            write!(f, "{info}")?;
        }
        write!(f, "] count={} chunks={}", self.count, self.chunks.len())
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("components", &self.ids)
            .field("count", &self.count)
            .field("add_edges", &self.add_edges)
            .field("remove_edges", &self.remove_edges)
            .finish()
    }
}
