//! # Archetype graph
//!
//! Owns every [`Archetype`] in an arena of slots addressed by
//! [`ArchetypeHandle`] and links archetypes that differ by exactly one
//! component with add/remove [`Edge`]s.
//!
//! ## Design
//! - Nodes are found by the hash of their sorted id set through
//!   `type_index`; a hash hit is always confirmed against the stored type.
//! - A structural change first tries the one-hop edge of the current
//!   archetype and only falls back to a hash lookup (and creation) on a miss.
//! - [`ArchetypeGraph::insert_vertex`] wires a new node to every existing
//!   node one component smaller or larger, so later transitions between
//!   known types are single edge hops.
//! - Every graph gets a process-unique `id`, and `version` increases on
//!   every archetype creation and only then. Queries key their cached match
//!   set on both, so a query handed a different world re-matches. A cached
//!   handle whose slot was compacted away resolves to nothing until the
//!   slot is reused, which is itself a creation.
//!
//! ## Invariants
//! - Slot [`ROOT`] holds the empty archetype and is never removed.
//! - Every edge connects two live slots whose types differ by exactly the
//!   edge's component.
//! - Compaction frees slots but never renumbers surviving ones.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::archetype::{hash_ids, hash_with, hash_without, Archetype};
use crate::engine::component::{component_name, ComponentInfo};
use crate::engine::error::violation;
use crate::engine::types::{ArchetypeHandle, ArchetypeID, ComponentID};


/// Handle of the empty archetype.
pub const ROOT: ArchetypeHandle = 0;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

/// Arena of archetypes plus the single-component transition edges between
/// them.

pub struct ArchetypeGraph {
    slots: Vec<Option<Archetype>>,
    free: Vec<ArchetypeHandle>,
    type_index: HashMap<ArchetypeID, ArchetypeHandle>,
    id: u64,
    version: u64,
    live: usize,
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl ArchetypeGraph {
    /// Creates a graph holding only the empty archetype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph with room for `capacity` archetypes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut graph = Self {
            slots: Vec::with_capacity(capacity.max(1)),
            free: Vec::new(),
            type_index: HashMap::with_capacity(capacity.max(1)),
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            version: 0,
            live: 0,
        };
        graph.insert_vertex(Vec::new());
        graph
    }

    /// Handle of the empty archetype.
    #[inline]
    pub fn root(&self) -> ArchetypeHandle { ROOT }

    /// Process-unique identity of this graph.
    #[inline]
    pub fn id(&self) -> u64 { self.id }

    /// Number of archetype creations so far.
    #[inline]
    pub fn version(&self) -> u64 { self.version }

    /// Number of live archetypes, the root included.
    #[inline]
    pub fn len(&self) -> usize { self.live }

    /// Always `false`: the root archetype is never removed.
    #[inline]
    pub fn is_empty(&self) -> bool { self.live == 0 }

    /// Archetype in slot `handle`, if the slot is live.
    #[inline]
    pub fn get(&self, handle: ArchetypeHandle) -> Option<&Archetype> {
        self.slots.get(handle as usize)?.as_ref()
    }

    /// Archetype in slot `handle` mutably, if the slot is live.
    #[inline]
    pub fn get_mut(&mut self, handle: ArchetypeHandle) -> Option<&mut Archetype> {
        self.slots.get_mut(handle as usize)?.as_mut()
    }

    /// Archetype in slot `handle`.
    ///
    /// ## Panics
    /// Panics if the slot is vacant.

    #[inline]
    pub fn archetype(&self, handle: ArchetypeHandle) -> &Archetype {
        match self.get(handle) {
            Some(archetype) => archetype,
            None => violation(format!("archetype slot {handle} is vacant")),
        }
    }

    /// Archetype in slot `handle`, mutably.
    ///
    /// ## Panics
    /// Panics if the slot is vacant.

    #[inline]
    pub fn archetype_mut(&mut self, handle: ArchetypeHandle) -> &mut Archetype {
        match self.get_mut(handle) {
            Some(archetype) => archetype,
            None => violation(format!("archetype slot {handle} is vacant")),
        }
    }

    /// Live archetypes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Live archetypes in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Raw slot array; vacant slots are `None`.
    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [Option<Archetype>] {
        &mut self.slots
    }

    /// Returns mutable references to two distinct archetypes.
    ///
    /// ## Panics
    /// Panics if `a == b` or either slot is vacant.

    pub fn pair_mut(&mut self, a: ArchetypeHandle, b: ArchetypeHandle) -> (&mut Archetype, &mut Archetype) {
        assert!(a != b, "pair_mut needs two distinct archetypes");

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.slots.split_at_mut(high as usize);

        let (left, right) = match (head[low as usize].as_mut(), tail[0].as_mut()) {
            (Some(left), Some(right)) => (left, right),
            _ => violation(format!("archetype slot {low} or {high} is vacant")),
        };

        if a < b { (left, right) } else { (right, left) }
    }

    /// Looks up the archetype whose sorted type is `ids`.
    pub fn find(&self, ids: &[ComponentID]) -> Option<ArchetypeHandle> {
        self.lookup(hash_ids(ids.iter().copied()), ids.len(), |archetype| {
            archetype.component_ids() == ids
        })
    }

    fn lookup(
        &self,
        hash: ArchetypeID,
        len: usize,
        same_type: impl FnOnce(&Archetype) -> bool,
    ) -> Option<ArchetypeHandle> {
        let handle = *self.type_index.get(&hash)?;
        let archetype = self.archetype(handle);
        if archetype.component_ids().len() != len || !same_type(archetype) {
            violation(format!(
                "archetype hash collision on {hash:#x}: slot {handle} holds a different type"
            ));
        }
        Some(handle)
    }

    /// Returns the archetype reached from `from` by adding `info`, creating
    /// it on first use.

    pub fn find_or_create_with(&mut self, from: ArchetypeHandle, info: ComponentInfo) -> ArchetypeHandle {
        let source = self.archetype(from);
        if source.has(info.id) {
            return from;
        }
        if let Some(next) = source.add_edge(info.id) {
            return next;
        }

        let hash = hash_with(source.component_ids(), info.id);
        let found = self.lookup(hash, source.component_ids().len() + 1, |candidate| {
            candidate.is_superset_by(source, info.id)
        });
        let next = match found {
            Some(next) => next,
            None => {
                let mut components = source.components().to_vec();
                let at = components.partition_point(|existing| existing.id < info.id);
                components.insert(at, info);
                self.insert_vertex(components)
            }
        };

        self.archetype_mut(from).set_add_edge(info.id, next);
        self.archetype_mut(next).set_remove_edge(info.id, from);
        next
    }

    /// Returns the archetype reached from `from` by removing `id`, creating
    /// it on first use.

    pub fn find_or_create_without(&mut self, from: ArchetypeHandle, id: ComponentID) -> ArchetypeHandle {
        let source = self.archetype(from);
        if !source.has(id) {
            return from;
        }
        if let Some(next) = source.remove_edge(id) {
            return next;
        }

        let hash = hash_without(source.component_ids(), id);
        let found = self.lookup(hash, source.component_ids().len() - 1, |candidate| {
            source.is_superset_by(candidate, id)
        });
        let next = match found {
            Some(next) => next,
            None => {
                let components = source
                    .components()
                    .iter()
                    .copied()
                    .filter(|info| info.id != id)
                    .collect();
                self.insert_vertex(components)
            }
        };

        self.archetype_mut(from).set_remove_edge(id, next);
        self.archetype_mut(next).set_add_edge(id, from);
        next
    }

    /// Returns the archetype of exactly `components`, creating it on first
    /// use. `components` must be sorted and free of duplicates.

    pub fn find_or_create(&mut self, components: &[ComponentInfo]) -> ArchetypeHandle {
        let ids: Vec<ComponentID> = components.iter().map(|info| info.id).collect();
        match self.find(&ids) {
            Some(handle) => handle,
            None => self.insert_vertex(components.to_vec()),
        }
    }

    /// Creates the archetype of `components` and links it into the graph.
    ///
    /// ## Behavior
    /// - Takes a free slot when one exists, otherwise appends.
    /// - Bumps `version`.
    /// - Calls [`ArchetypeGraph::make_edges`] for the new node.

    pub fn insert_vertex(&mut self, components: Vec<ComponentInfo>) -> ArchetypeHandle {
        let handle = match self.free.pop() {
            Some(handle) => handle,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as ArchetypeHandle
            }
        };

        let archetype = Archetype::new(handle, components);
        log::debug!("created archetype {archetype}");
        self.type_index.insert(archetype.id(), handle);
        self.slots[handle as usize] = Some(archetype);
        self.version += 1;
        self.live += 1;

        self.make_edges(handle);
        handle
    }

    /// Wires bidirectional edges between `handle` and every live archetype
    /// whose type differs from it by exactly one component.
    ///
    /// ## Behavior
    /// - Subsets are found by hashing the type without each of its ids.
    /// - Supersets are found by scanning archetypes one component larger.
    /// - An existing edge for the same component is replaced.

    pub fn make_edges(&mut self, handle: ArchetypeHandle) {
        let ids = self.archetype(handle).component_ids().to_vec();

        let mut subsets = Vec::new();
        for &id in &ids {
            let hash = hash_without(&ids, id);
            if let Some(&subset) = self.type_index.get(&hash) {
                if self.archetype(handle).is_superset_by(self.archetype(subset), id) {
                    subsets.push((id, subset));
                }
            }
        }

        let node = self.archetype(handle);
        let supersets: Vec<(ComponentID, ArchetypeHandle)> = self
            .iter()
            .filter(|candidate| candidate.component_ids().len() == ids.len() + 1)
            .filter_map(|candidate| {
                let extra = candidate.component_ids().iter().copied().find(|&id| !node.has(id))?;
                candidate.is_superset_by(node, extra).then(|| (extra, candidate.handle()))
            })
            .collect();

        for (id, subset) in subsets {
            self.archetype_mut(subset).set_add_edge(id, handle);
            self.archetype_mut(handle).set_remove_edge(id, subset);
        }
        for (id, superset) in supersets {
            self.archetype_mut(superset).set_remove_edge(id, handle);
            self.archetype_mut(handle).set_add_edge(id, superset);
        }
    }

    /// Deletes every archetype that holds no rows and has no add-descendant
    /// that holds rows, then drops edges into deleted slots.
    ///
    /// Returns the number of archetypes removed. The root always survives.

    pub fn remove_empty_archetypes(&mut self) -> usize {
        let mut order: Vec<ArchetypeHandle> = self.iter().map(Archetype::handle).collect();
        order.sort_unstable_by_key(|&handle| std::cmp::Reverse(self.archetype(handle).component_ids().len()));

        // add-edges always point one component larger, so descendants are
        // decided before their ancestors
        let mut keep = vec![false; self.slots.len()];
        for &handle in &order {
            let archetype = self.archetype(handle);
            let kept = handle == ROOT
                || !archetype.is_empty()
                || archetype.add_edges().iter().any(|edge| keep[edge.archetype as usize]);
            keep[handle as usize] = kept;
        }

        let mut removed = 0;
        for handle in order {
            if keep[handle as usize] { continue; }
            if let Some(archetype) = self.slots[handle as usize].take() {
                log::debug!("compaction removed archetype {archetype}");
                self.type_index.remove(&archetype.id());
                self.free.push(handle);
                self.live -= 1;
                removed += 1;
            }
        }

        if removed > 0 {
            for archetype in self.iter_mut() {
                archetype.retain_edges(|target| keep[target as usize]);
            }
        }
        removed
    }
}

impl fmt::Display for ArchetypeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "archetype graph v{} ({} archetypes)", self.version, self.live)?;
        for archetype in self.iter() {
            write!(f, "  #{} [", archetype.handle())?;
            for (i, &id) in archetype.component_ids().iter().enumerate() {
                if i > 0 { f.write_str(", ")?; }
                f.write_str(component_name(id))?;
            }
            writeln!(f, "] count={}", archetype.len())?;
            for edge in archetype.add_edges() {
                writeln!(f, "    +{} -> #{}", component_name(edge.component), edge.archetype)?;
            }
            for edge in archetype.remove_edges() {
                writeln!(f, "    -{} -> #{}", component_name(edge.component), edge.archetype)?;
            }
        }
        Ok(())
    }
}
