//! # Columnar ECS
//!
//! In-memory entity-component store with archetype-based, chunked columnar
//! storage.
//!
//! ## Design Goals
//! - Archetype graph with cached add/remove edges for cheap moves
//! - Fixed-size chunks of typed columns for cache-friendly iteration
//! - Cached queries with per-row added/changed tick filters
//! - Deferred structural edits so iteration never sees storage shift
//!
//! ## Example
//! ```rust
//! use columnar_ecs::prelude::*;
//!
//! #[derive(Default)]
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! let mut world = World::new();
//! let e = world.spawn();
//! world.add::<Position>(e);
//! world.set(e, Velocity(2.0));
//!
//! let mut query = world.query_builder().data::<Position>().data::<Velocity>().build();
//! for mut chunk in query.iter_mut(&mut world) {
//!     if let Some((positions, velocities)) = chunk.columns_mut::<Position, Velocity>() {
//!         for (p, v) in positions.iter_mut().zip(velocities.iter()) {
//!             p.0 += v.0;
//!         }
//!     }
//! }
//! assert_eq!(world.get::<Position>(e).0, 2.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::world::{
    World,
    WorldConfig,
};

pub use engine::entity::{
    Entity,
    EntityIndex,
    EntityRecord,
};

pub use engine::component::{
    ComponentInfo,
    ComponentDesc,
    register_component,
    register_pair,
    register_relation,
    component_id_of,
    component_info,
    component_name,
};

pub use engine::archetype::Archetype;
pub use engine::graph::{ArchetypeGraph, ROOT};

pub use engine::query::{
    Query,
    QueryBuilder,
    QueryChunk,
    QueryChunkMut,
    Term,
    TermOp,
    RowSelection,
};

pub use engine::commands::{Command, Commands};

pub use engine::error::{
    ECSResult,
    ECSError,
    MoveError,
    ColumnError,
};

pub use engine::types::{
    Bundle,
    DynamicBundle,
    EntityID,
    ComponentID,
    ArchetypeID,
    ArchetypeHandle,
    RowID,
    Tick,
    CHUNK_CAP,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use columnar_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        World,
        WorldConfig,
        Entity,
        Bundle,
        Commands,
        Query,
        QueryBuilder,
        Term,
        TermOp,
        register_component,
        component_id_of,
    };
}
