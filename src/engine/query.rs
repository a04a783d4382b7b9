//! Term-based query construction, matching and chunk iteration.
//!
//! A [`QueryBuilder`] collects [`Term`]s keyed by component id and compiles
//! them into a [`Query`]. The query matches archetypes with a merge-join over
//! the archetype's sorted id array and its own sorted term array, caches the
//! match set against the archetype graph's identity and version, and
//! iterates matching storage lazily one chunk at a time.
//!
//! ## Execution model
//! 1. Compile: terms are deduplicated by id (a later term for the same id
//!    replaces the earlier one), sorted, and hashed into a debug key.
//! 2. Match: on first use, and again whenever the query meets a different
//!    graph or the graph version has moved,
//!    every live archetype is tested and its columns are resolved once.
//! 3. Iterate: each non-empty chunk of a matched archetype becomes a
//!    [`QueryChunk`] (shared) or [`QueryChunkMut`] (exclusive) view over the
//!    rows selected by the change filters.
//!
//! ## Change detection
//! `Added` and `Changed` filters keep a row iff its tick `t` satisfies
//! `last_run <= t < this_run`. `MarkChanged` stamps `this_run` on every
//! selected row of its column as a side effect of exclusive iteration; the
//! selection itself is computed before the stamp.
//!
//! ## Concurrency
//! [`Query::par_for_each_chunk`] and [`Query::par_for_each_chunk_mut`] hand
//! whole chunks to rayon. Chunks are disjoint, so exclusive views never
//! alias.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use rayon::prelude::*;

use crate::engine::archetype::Archetype;
use crate::engine::commands::Commands;
use crate::engine::component::{
    component_id_of, component_info, component_name, register_component, register_pair,
    register_relation,
};
use crate::engine::entity::Entity;
use crate::engine::error::{violation, TagAccessError};
use crate::engine::graph::ArchetypeGraph;
use crate::engine::storage::Chunk;
use crate::engine::types::{split_row, ArchetypeHandle, ComponentID, Tick};
use crate::engine::world::World;


/// Operator of a query term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermOp {
    /// Component must be present and its column is read or written.
    DataAccess,
    /// Component must be present.
    With,
    /// Component must be absent.
    Without,
    /// Component may be present; never rejects.
    Optional,
    /// At least one child id must be present.
    AtLeastOne,
    /// All child ids must be present and nothing else.
    Exactly,
    /// No child id may be present.
    None,
    /// At least one child term must hold.
    Or,
}

impl TermOp {
    /// Returns `true` for operators that group child terms.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, TermOp::AtLeastOne | TermOp::Exactly | TermOp::None | TermOp::Or)
    }
}

/// One clause of a query filter.
///
/// Simple terms carry a component id; container terms carry their children
/// and an id of `0`.

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    /// Component, tag or pair id.
    pub id: ComponentID,
    /// Operator.
    pub op: TermOp,
    /// Children of a container term.
    pub children: Vec<Term>,
}

impl Term {
    /// Simple term over `id`.
    #[inline]
    pub fn new(id: ComponentID, op: TermOp) -> Self {
        Self { id, op, children: Vec::new() }
    }

    /// `With` term over `T`.
    pub fn with<T: 'static + Send + Sync>() -> Self {
        Self::new(component_id_of::<T>(), TermOp::With)
    }

    /// `Without` term over `T`.
    pub fn without<T: 'static + Send + Sync>() -> Self {
        Self::new(component_id_of::<T>(), TermOp::Without)
    }

    /// Container term over simple `children`.
    pub fn group(op: TermOp, children: Vec<Term>) -> Self {
        debug_assert!(op.is_container(), "group needs a container operator");
        Self { id: 0, op, children }
    }

    /// Tests this term on its own against an archetype's sorted ids.
    pub fn matches(&self, archetype: &Archetype) -> bool {
        match self.op {
            TermOp::DataAccess | TermOp::With => archetype.has(self.id),
            TermOp::Without => !archetype.has(self.id),
            TermOp::Optional => true,
            TermOp::AtLeastOne => self.children.iter().any(|child| archetype.has(child.id)),
            TermOp::Exactly => {
                archetype.component_ids().len() == self.children.len()
                    && self.children.iter().all(|child| archetype.has(child.id))
            }
            TermOp::None => !self.children.iter().any(|child| archetype.has(child.id)),
            TermOp::Or => self.children.iter().any(|child| child.matches(archetype)),
        }
    }
}

/// Kind of tick a change filter compares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Tick of the attach that created the value.
    Added,
    /// Tick of the last write.
    Changed,
}

fn require_data(id: ComponentID) {
    if component_info(id).is_tag() {
        violation(TagAccessError { component_id: id, name: component_name(id) });
    }
}

/// Builder for [`Query`].
///
/// ## Example
/// ```ignore
/// let mut query = world
///     .query_builder()
///     .with::<Position>()
///     .without::<Frozen>()
///     .optional::<Velocity>()
///     .build();
/// for chunk in query.iter(&world) { /* ... */ }
/// ```

#[derive(Default, Clone, Debug)]
pub struct QueryBuilder {
    terms: Vec<Term>,
    groups: Vec<Term>,
    filters: Vec<(ComponentID, ChangeKind)>,
    marks: Vec<ComponentID>,
}

impl QueryBuilder {
    /// Creates an empty builder; an empty query matches every archetype.
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, id: ComponentID, op: TermOp) {
        match self.terms.iter_mut().find(|term| term.id == id) {
            Some(term) => term.op = op,
            None => self.terms.push(Term::new(id, op)),
        }
    }

    fn require(&mut self, id: ComponentID) {
        let current = self.terms.iter().find(|term| term.id == id).map(|term| term.op);
        if current != Some(TermOp::DataAccess) {
            self.put(id, TermOp::With);
        }
    }

    /// Requires `T`.
    pub fn with<T: 'static + Send + Sync>(self) -> Self {
        self.with_id(component_id_of::<T>())
    }

    /// Excludes `T`.
    pub fn without<T: 'static + Send + Sync>(self) -> Self {
        self.without_id(component_id_of::<T>())
    }

    /// Resolves `T`'s column when present without requiring it.
    ///
    /// ## Panics
    /// Panics if `T` is a tag.

    pub fn optional<T: 'static + Send + Sync>(mut self) -> Self {
        let id = register_component::<T>().id;
        require_data(id);
        self.put(id, TermOp::Optional);
        self
    }

    /// Requires `T` and declares access to its column.
    ///
    /// ## Panics
    /// Panics if `T` is a tag.

    pub fn data<T: 'static + Send + Sync>(mut self) -> Self {
        let id = register_component::<T>().id;
        require_data(id);
        self.put(id, TermOp::DataAccess);
        self
    }

    /// Requires the raw id `id`.
    pub fn with_id(mut self, id: ComponentID) -> Self {
        self.put(id, TermOp::With);
        self
    }

    /// Excludes the raw id `id`.
    pub fn without_id(mut self, id: ComponentID) -> Self {
        self.put(id, TermOp::Without);
        self
    }

    /// Requires the relation pair `(A, B)`.
    pub fn with_pair<A: 'static + Send + Sync, B: 'static + Send + Sync>(self) -> Self {
        self.with_id(register_pair::<A, B>().id)
    }

    /// Requires the relation `(R, target)`.
    pub fn with_relation<R: 'static + Send + Sync>(self, target: Entity) -> Self {
        self.with_id(register_relation::<R>(target).id)
    }

    /// Matches archetypes holding at least one of `ids`.
    pub fn at_least_one(mut self, ids: &[ComponentID]) -> Self {
        self.groups.push(Term::group(TermOp::AtLeastOne, ids.iter().map(|&id| Term::new(id, TermOp::With)).collect()));
        self
    }

    /// Matches archetypes whose type is exactly `ids`.
    pub fn exactly(mut self, ids: &[ComponentID]) -> Self {
        self.groups.push(Term::group(TermOp::Exactly, ids.iter().map(|&id| Term::new(id, TermOp::With)).collect()));
        self
    }

    /// Matches archetypes holding none of `ids`.
    pub fn none(mut self, ids: &[ComponentID]) -> Self {
        self.groups.push(Term::group(TermOp::None, ids.iter().map(|&id| Term::new(id, TermOp::Without)).collect()));
        self
    }

    /// Matches archetypes satisfying at least one of `alternatives`.
    pub fn or(mut self, alternatives: Vec<Term>) -> Self {
        self.groups.push(Term::group(TermOp::Or, alternatives));
        self
    }

    /// Keeps rows whose `T` was attached inside the query window. Implies
    /// `with::<T>()`.
    ///
    /// ## Panics
    /// Panics if `T` is a tag.

    pub fn added<T: 'static + Send + Sync>(self) -> Self {
        self.change_filter(component_id_of::<T>(), ChangeKind::Added)
    }

    /// Keeps rows whose `T` was written inside the query window. Implies
    /// `with::<T>()`.
    ///
    /// ## Panics
    /// Panics if `T` is a tag.

    pub fn changed<T: 'static + Send + Sync>(self) -> Self {
        self.change_filter(component_id_of::<T>(), ChangeKind::Changed)
    }

    fn change_filter(mut self, id: ComponentID, kind: ChangeKind) -> Self {
        require_data(id);
        self.require(id);
        if !self.filters.contains(&(id, kind)) {
            self.filters.push((id, kind));
        }
        self
    }

    /// Stamps the query's `this_run` tick on `T` for every row visited by
    /// exclusive iteration. Implies `optional::<T>()` unless another term
    /// already names `T`.
    ///
    /// ## Panics
    /// Panics if `T` is a tag.

    pub fn mark_changed<T: 'static + Send + Sync>(mut self) -> Self {
        let id = component_id_of::<T>();
        require_data(id);
        if !self.terms.iter().any(|term| term.id == id) {
            self.put(id, TermOp::Optional);
        }
        if !self.marks.contains(&id) {
            self.marks.push(id);
        }
        self
    }

    /// Compiles the query.
    pub fn build(self) -> Query {
        let mut terms = self.terms;
        terms.sort_by_key(|term| term.id);
        let simple = terms.len();

        let resolved: Vec<ComponentID> = terms
            .iter()
            .filter(|term| term.op != TermOp::Without)
            .map(|term| term.id)
            .filter(|&id| !component_info(id).is_tag())
            .collect();

        let position_of = |id: ComponentID| resolved.iter().position(|&r| r == id);
        let filters: Vec<(usize, ChangeKind)> = self
            .filters
            .iter()
            .filter_map(|&(id, kind)| position_of(id).map(|slot| (slot, kind)))
            .collect();
        let marks: Vec<usize> = self.marks.iter().filter_map(|&id| position_of(id)).collect();

        terms.extend(self.groups);

        let mut hasher = DefaultHasher::new();
        terms.hash(&mut hasher);
        self.filters.hash(&mut hasher);
        self.marks.hash(&mut hasher);
        let hash = hasher.finish();

        log::trace!("compiled query {hash:#x} with {} terms", terms.len());

        Query {
            terms,
            simple,
            resolved,
            filters,
            marks,
            hash,
            cache: Vec::new(),
            cached_for: None,
            evaluations: 0,
            last_run: 0,
            this_run: 0,
        }
    }
}

/// An archetype in a query's match set with its resolved columns.
///
/// `columns[i]` is the chunk column of the query's `i`-th resolved id, or
/// `None` when the archetype does not carry it.

#[derive(Clone, Debug)]
pub struct MatchedArchetype {
    /// Arena slot of the archetype.
    pub handle: ArchetypeHandle,
    /// Column per resolved id.
    pub columns: Vec<Option<usize>>,
}

/// A compiled, cached query.
///
/// ## Invariants
/// - `terms[..simple]` are simple terms sorted by id; containers follow.
/// - `cache` is sorted by handle and valid for the graph `(id, version)`
///   in `cached_for`.

#[derive(Clone, Debug)]
pub struct Query {
    terms: Vec<Term>,
    simple: usize,
    resolved: Vec<ComponentID>,
    filters: Vec<(usize, ChangeKind)>,
    marks: Vec<usize>,
    hash: u64,
    cache: Vec<MatchedArchetype>,
    cached_for: Option<(u64, u64)>,
    evaluations: usize,
    last_run: Tick,
    this_run: Tick,
}

impl Query {

    /// Compiled terms: simple terms by id, then containers.
    #[inline]
    pub fn terms(&self) -> &[Term] { &self.terms }

    /// Debug key of the compiled term set.
    #[inline]
    pub fn hash(&self) -> u64 { self.hash }

    /// Number of times the match set has been recomputed.
    #[inline]
    pub fn evaluations(&self) -> usize { self.evaluations }

    /// Current change window `(last_run, this_run)`.
    #[inline]
    pub fn ticks(&self) -> (Tick, Tick) { (self.last_run, self.this_run) }

    /// Sets the change window to `[last_run, this_run)`.
    #[inline]
    pub fn set_ticks(&mut self, last_run: Tick, this_run: Tick) {
        self.last_run = last_run;
        self.this_run = this_run;
    }

    /// Slides the change window: the previous `this_run` becomes `last_run`.
    #[inline]
    pub fn advance(&mut self, this_run: Tick) {
        self.last_run = self.this_run;
        self.this_run = this_run;
    }

    /// Tests the compiled terms against one archetype.
    ///
    /// ## Behavior
    /// Walks the archetype's sorted ids and the sorted simple terms in
    /// lock-step. A required term with no matching id rejects; a `Without`
    /// term with a matching id rejects; `Optional` never rejects. Container
    /// terms are evaluated afterwards on their own.

    pub fn matches(&self, archetype: &Archetype) -> bool {
        let ids = archetype.component_ids();
        let mut cursor = 0;

        for term in &self.terms[..self.simple] {
            while cursor < ids.len() && ids[cursor] < term.id {
                cursor += 1;
            }
            let present = cursor < ids.len() && ids[cursor] == term.id;
            match term.op {
                TermOp::DataAccess | TermOp::With if !present => return false,
                TermOp::Without if present => return false,
                _ => {}
            }
        }

        self.terms[self.simple..].iter().all(|group| group.matches(archetype))
    }

    fn resolve(&self, archetype: &Archetype) -> MatchedArchetype {
        MatchedArchetype {
            handle: archetype.handle(),
            columns: self.resolved.iter().map(|&id| archetype.column_index(id)).collect(),
        }
    }

    /// Recomputes the match set unless it was last evaluated against this
    /// very graph at its current version.

    pub fn refresh(&mut self, graph: &ArchetypeGraph) {
        let key = (graph.id(), graph.version());
        if self.cached_for == Some(key) {
            return;
        }
        let matched: Vec<MatchedArchetype> = graph
            .iter()
            .filter(|archetype| self.matches(archetype))
            .map(|archetype| self.resolve(archetype))
            .collect();
        self.cache = matched;
        self.cached_for = Some(key);
        self.evaluations += 1;
        log::trace!("query {:#x} matched {} archetypes", self.hash, self.cache.len());
    }

    /// Handles of the archetypes currently matched.
    pub fn matched_archetypes(&mut self, world: &World) -> Vec<ArchetypeHandle> {
        self.refresh(world.graph());
        self.cache.iter().map(|matched| matched.handle).collect()
    }

    /// Lazily visits every matching chunk through shared views.
    ///
    /// `MarkChanged` terms have no effect here; use
    /// [`Query::iter_mut`] or [`Query::each`] to stamp.

    pub fn iter<'w>(&'w mut self, world: &'w World) -> QueryIter<'w> {
        self.refresh(world.graph());
        QueryIter {
            graph: world.graph(),
            matched: self.cache.iter(),
            current: None,
            resolved: &self.resolved,
            filters: &self.filters,
            window: (self.last_run, self.this_run),
        }
    }

    /// Lazily visits every matching chunk through exclusive views.
    ///
    /// Pending records queued through [`World::commands`] are applied first.

    pub fn iter_mut<'w>(&'w mut self, world: &'w mut World) -> QueryIterMut<'w> {
        if !world.is_deferred() {
            world.flush();
        }
        self.refresh(world.graph());
        let tick = world.tick();
        self.iter_slots(world.graph_mut().slots_mut(), tick)
    }

    fn iter_slots<'w>(&'w self, slots: &'w mut [Option<Archetype>], tick: Tick) -> QueryIterMut<'w> {
        QueryIterMut {
            slots: slots.iter_mut().enumerate(),
            matched: self.cache.iter(),
            current: None,
            resolved: &self.resolved,
            filters: &self.filters,
            marks: &self.marks,
            window: (self.last_run, self.this_run),
            tick,
        }
    }

    /// Visits every matching chunk inside a deferred scope.
    ///
    /// Structural edits requested through the [`Commands`] handle are
    /// queued and applied, in order, when the scope closes. If `f` panics
    /// the scope still closes; the queued edits stay pending.

    pub fn each<F>(&mut self, world: &mut World, mut f: F)
    where
        F: FnMut(QueryChunkMut<'_>, &Commands<'_>),
    {
        let mut scope = world.deferred_scope();
        self.refresh(scope.graph());
        let (graph, commands, tick) = scope.split_for_iteration();
        for chunk in self.iter_slots(graph.slots_mut(), tick) {
            f(chunk, &commands);
        }
    }

    /// Returns the single-row view of `entity` if its archetype matches and
    /// its row passes the change filters.
    ///
    /// ## Panics
    /// Panics if `entity` is dead.

    pub fn iter_entity<'w>(&'w mut self, world: &'w World, entity: Entity) -> Option<QueryChunk<'w>> {
        let record = world.record(entity)?;
        self.refresh(world.graph());

        let position = self.cache.binary_search_by_key(&record.archetype, |m| m.handle).ok()?;
        let matched = &self.cache[position];
        let archetype = world.graph().get(record.archetype)?;
        let (chunk_index, offset) = split_row(record.row);
        let chunk = archetype.chunks().get(chunk_index)?;

        let window = (self.last_run, self.this_run);
        if !row_passes(chunk, &matched.columns, &self.filters, window, offset) {
            return None;
        }

        Some(QueryChunk {
            handle: matched.handle,
            chunk_index,
            chunk,
            resolved: &self.resolved,
            columns: &matched.columns,
            rows: RowSelection::Rows(vec![offset as u32]),
        })
    }

    /// Number of entities in matched archetypes. Change filters are ignored.
    pub fn count(&mut self, world: &World) -> usize {
        self.refresh(world.graph());
        self.cache
            .iter()
            .filter_map(|matched| world.graph().get(matched.handle))
            .map(Archetype::len)
            .sum()
    }

    /// Selected entities across every matching chunk.
    pub fn entities(&mut self, world: &World) -> Vec<Entity> {
        let mut out = Vec::new();
        for chunk in self.iter(world) {
            out.extend(chunk.selected_entities());
        }
        out
    }

    /// Calls `f` on every matching chunk in parallel through shared views.
    pub fn par_for_each_chunk<F>(&mut self, world: &World, f: F)
    where
        F: Fn(QueryChunk<'_>) + Send + Sync,
    {
        let chunks: Vec<QueryChunk<'_>> = self.iter(world).collect();
        chunks.into_par_iter().for_each(|chunk| f(chunk));
    }

    /// Calls `f` on every matching chunk in parallel through exclusive views.
    pub fn par_for_each_chunk_mut<F>(&mut self, world: &mut World, f: F)
    where
        F: Fn(QueryChunkMut<'_>) + Send + Sync,
    {
        let chunks: Vec<QueryChunkMut<'_>> = self.iter_mut(world).collect();
        chunks.into_par_iter().for_each(|chunk| f(chunk));
    }
}

/// Rows of a chunk selected by a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowSelection {
    /// Every valid row `[0, count)`.
    All(usize),
    /// An ascending list of offsets.
    Rows(Vec<u32>),
}

impl RowSelection {
    /// Number of selected rows.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            RowSelection::All(count) => *count,
            RowSelection::Rows(rows) => rows.len(),
        }
    }

    /// Returns `true` if no row is selected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected offsets in ascending order.
    #[inline]
    pub fn iter(&self) -> SelectedRows<'_> {
        match self {
            RowSelection::All(count) => SelectedRows::All(0..*count),
            RowSelection::Rows(rows) => SelectedRows::Rows(rows.iter()),
        }
    }
}

/// Iterator over selected offsets.
pub enum SelectedRows<'a> {
    /// Dense range.
    All(Range<usize>),
    /// Sparse list.
    Rows(std::slice::Iter<'a, u32>),
}

impl Iterator for SelectedRows<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        match self {
            SelectedRows::All(range) => range.next(),
            SelectedRows::Rows(rows) => rows.next().map(|&row| row as usize),
        }
    }
}

#[inline]
fn in_window(tick: Tick, (last_run, this_run): (Tick, Tick)) -> bool {
    last_run <= tick && tick < this_run
}

fn row_passes(
    chunk: &Chunk,
    columns: &[Option<usize>],
    filters: &[(usize, ChangeKind)],
    window: (Tick, Tick),
    offset: usize,
) -> bool {
    filters.iter().all(|&(slot, kind)| {
        let Some(column) = columns[slot] else { return false };
        let column = chunk.column_dyn(column);
        let ticks = match kind {
            ChangeKind::Added => column.added_ticks(),
            ChangeKind::Changed => column.changed_ticks(),
        };
        ticks.get(offset).map_or(false, |&tick| in_window(tick, window))
    })
}

fn select_rows(
    chunk: &Chunk,
    columns: &[Option<usize>],
    filters: &[(usize, ChangeKind)],
    window: (Tick, Tick),
) -> RowSelection {
    let count = chunk.count();
    if filters.is_empty() || count == 0 {
        return RowSelection::All(count);
    }
    RowSelection::Rows(
        (0..count)
            .filter(|&offset| row_passes(chunk, columns, filters, window, offset))
            .map(|offset| offset as u32)
            .collect(),
    )
}

fn stamp(changed: &mut [Tick], rows: &RowSelection, tick: Tick) {
    match rows {
        RowSelection::All(count) => changed[..*count].fill(tick),
        RowSelection::Rows(rows) => {
            for &row in rows {
                changed[row as usize] = tick;
            }
        }
    }
}

#[inline]
fn slot_of<T: 'static + Send + Sync>(resolved: &[ComponentID], columns: &[Option<usize>]) -> Option<usize> {
    let id = component_id_of::<T>();
    let position = resolved.iter().position(|&r| r == id)?;
    columns[position]
}

/// Shared view over the selected rows of one chunk.
///
/// Column slices cover every valid row of the chunk; pair them with
/// [`QueryChunk::rows`] to visit only the selected ones.

pub struct QueryChunk<'a> {
    handle: ArchetypeHandle,
    chunk_index: usize,
    chunk: &'a Chunk,
    resolved: &'a [ComponentID],
    columns: &'a [Option<usize>],
    rows: RowSelection,
}

impl<'a> QueryChunk<'a> {
    /// Archetype the chunk belongs to.
    #[inline]
    pub fn archetype(&self) -> ArchetypeHandle { self.handle }

    /// Index of the chunk within its archetype.
    #[inline]
    pub fn chunk_index(&self) -> usize { self.chunk_index }

    /// Entity ids of every valid row.
    #[inline]
    pub fn entities(&self) -> &'a [Entity] { self.chunk.entities() }

    /// Row selection of this view.
    #[inline]
    pub fn selection(&self) -> &RowSelection { &self.rows }

    /// Selected offsets.
    #[inline]
    pub fn rows(&self) -> SelectedRows<'_> { self.rows.iter() }

    /// Number of selected rows.
    #[inline]
    pub fn len(&self) -> usize { self.rows.len() }

    /// Returns `true` if no row is selected.
    #[inline]
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Entities of the selected rows.
    pub fn selected_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        let entities = self.chunk.entities();
        self.rows.iter().map(move |row| entities[row])
    }

    /// Column of `T`, or `None` when the query did not resolve it for this
    /// archetype.

    pub fn column<T: 'static + Send + Sync>(&self) -> Option<&'a [T]> {
        let column = slot_of::<T>(self.resolved, self.columns)?;
        Some(self.chunk.column::<T>(column)?.as_slice())
    }

    /// Value of `T` at `offset`.
    pub fn get<T: 'static + Send + Sync>(&self, offset: usize) -> Option<&'a T> {
        self.column::<T>()?.get(offset)
    }
}

/// Exclusive view over the selected rows of one chunk.
///
/// Writes through [`QueryChunkMut::column_mut`], [`QueryChunkMut::get_mut`]
/// and [`QueryChunkMut::set`] stamp the world tick onto the changed ticks
/// of the rows they cover.

pub struct QueryChunkMut<'a> {
    handle: ArchetypeHandle,
    chunk_index: usize,
    chunk: &'a mut Chunk,
    resolved: &'a [ComponentID],
    columns: &'a [Option<usize>],
    rows: RowSelection,
    tick: Tick,
}

impl<'a> QueryChunkMut<'a> {
    /// Archetype the chunk belongs to.
    #[inline]
    pub fn archetype(&self) -> ArchetypeHandle { self.handle }

    /// Index of the chunk within its archetype.
    #[inline]
    pub fn chunk_index(&self) -> usize { self.chunk_index }

    /// Entity ids of every valid row.
    #[inline]
    pub fn entities(&self) -> &[Entity] { self.chunk.entities() }

    /// Row selection of this view.
    #[inline]
    pub fn selection(&self) -> &RowSelection { &self.rows }

    /// Selected offsets.
    #[inline]
    pub fn rows(&self) -> SelectedRows<'_> { self.rows.iter() }

    /// Number of selected rows.
    #[inline]
    pub fn len(&self) -> usize { self.rows.len() }

    /// Returns `true` if no row is selected.
    #[inline]
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Entities of the selected rows.
    pub fn selected_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        let entities = self.chunk.entities();
        self.rows.iter().map(move |row| entities[row])
    }

    /// Column of `T`, read-only.
    pub fn column<T: 'static + Send + Sync>(&self) -> Option<&[T]> {
        let column = slot_of::<T>(self.resolved, self.columns)?;
        Some(self.chunk.column::<T>(column)?.as_slice())
    }

    /// Column of `T`, mutably. Stamps every selected row as changed.
    pub fn column_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut [T]> {
        let column = slot_of::<T>(self.resolved, self.columns)?;
        let (values, changed) = self.chunk.column_mut::<T>(column)?.values_and_changed_mut();
        stamp(changed, &self.rows, self.tick);
        Some(values)
    }

    /// Columns of `A` and `B`, mutably. Stamps every selected row of both.
    ///
    /// ## Panics
    /// Panics if `A` and `B` are the same component.

    pub fn columns_mut<A, B>(&mut self) -> Option<(&mut [A], &mut [B])>
    where
        A: 'static + Send + Sync,
        B: 'static + Send + Sync,
    {
        let a = slot_of::<A>(self.resolved, self.columns)?;
        let b = slot_of::<B>(self.resolved, self.columns)?;
        let (first, second) = self.chunk.column_pair_mut::<A, B>(a, b)?;
        let (a_values, a_changed) = first.values_and_changed_mut();
        let (b_values, b_changed) = second.values_and_changed_mut();
        stamp(a_changed, &self.rows, self.tick);
        stamp(b_changed, &self.rows, self.tick);
        Some((a_values, b_values))
    }

    /// Value of `T` at `offset`, read-only.
    pub fn get<T: 'static + Send + Sync>(&self, offset: usize) -> Option<&T> {
        self.column::<T>()?.get(offset)
    }

    /// Value of `T` at `offset`, mutably. Stamps that row as changed.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, offset: usize) -> Option<&mut T> {
        let column = slot_of::<T>(self.resolved, self.columns)?;
        let (values, changed) = self.chunk.column_mut::<T>(column)?.values_and_changed_mut();
        if offset >= values.len() { return None; }
        changed[offset] = self.tick;
        Some(&mut values[offset])
    }

    /// Overwrites `T` at `offset`. Returns `false` when the column or row is
    /// missing.

    pub fn set<T: 'static + Send + Sync>(&mut self, offset: usize, value: T) -> bool {
        match self.get_mut::<T>(offset) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Lazy iterator over shared chunk views. Chunks with no selected row are
/// skipped.

pub struct QueryIter<'w> {
    graph: &'w ArchetypeGraph,
    matched: std::slice::Iter<'w, MatchedArchetype>,
    current: Option<(&'w Archetype, &'w MatchedArchetype, usize)>,
    resolved: &'w [ComponentID],
    filters: &'w [(usize, ChangeKind)],
    window: (Tick, Tick),
}

impl<'w> Iterator for QueryIter<'w> {
    type Item = QueryChunk<'w>;

    fn next(&mut self) -> Option<QueryChunk<'w>> {
        loop {
            if let Some((archetype, matched, next_chunk)) = self.current {
                if let Some(chunk) = archetype.chunks().get(next_chunk) {
                    self.current = Some((archetype, matched, next_chunk + 1));
                    let rows = select_rows(chunk, &matched.columns, self.filters, self.window);
                    if rows.is_empty() { continue; }
                    return Some(QueryChunk {
                        handle: matched.handle,
                        chunk_index: next_chunk,
                        chunk,
                        resolved: self.resolved,
                        columns: &matched.columns,
                        rows,
                    });
                }
            }

            let matched = self.matched.next()?;
            self.current = self.graph.get(matched.handle).map(|archetype| (archetype, matched, 0));
        }
    }
}

/// Lazy iterator over exclusive chunk views. Chunks with no selected row are
/// skipped.

pub struct QueryIterMut<'w> {
    slots: std::iter::Enumerate<std::slice::IterMut<'w, Option<Archetype>>>,
    matched: std::slice::Iter<'w, MatchedArchetype>,
    current: Option<(&'w MatchedArchetype, std::iter::Enumerate<std::slice::IterMut<'w, Chunk>>)>,
    resolved: &'w [ComponentID],
    filters: &'w [(usize, ChangeKind)],
    marks: &'w [usize],
    window: (Tick, Tick),
    tick: Tick,
}

impl<'w> QueryIterMut<'w> {
    fn seek(&mut self, matched: &'w MatchedArchetype) {
        self.current = None;
        for (index, slot) in self.slots.by_ref() {
            let handle = index as ArchetypeHandle;
            if handle < matched.handle { continue; }
            if handle == matched.handle {
                if let Some(archetype) = slot.as_mut() {
                    self.current = Some((matched, archetype.chunks_mut().iter_mut().enumerate()));
                }
            }
            break;
        }
    }
}

impl<'w> Iterator for QueryIterMut<'w> {
    type Item = QueryChunkMut<'w>;

    fn next(&mut self) -> Option<QueryChunkMut<'w>> {
        loop {
            if let Some((matched, chunks)) = self.current.as_mut() {
                let matched: &'w MatchedArchetype = *matched;
                if let Some((chunk_index, chunk)) = chunks.next() {
                    let rows = select_rows(chunk, &matched.columns, self.filters, self.window);
                    if rows.is_empty() { continue; }

                    for &slot in self.marks {
                        if let Some(column) = matched.columns[slot] {
                            stamp(chunk.column_dyn_mut(column).changed_ticks_mut(), &rows, self.window.1);
                        }
                    }

                    return Some(QueryChunkMut {
                        handle: matched.handle,
                        chunk_index,
                        chunk,
                        resolved: self.resolved,
                        columns: &matched.columns,
                        rows,
                        tick: self.tick,
                    });
                }
            }

            let matched = self.matched.next()?;
            self.seek(matched);
        }
    }
}
