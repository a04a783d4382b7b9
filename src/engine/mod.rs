//! # Engine Module
//!
//! Internal building blocks of the store:
//! - Identifier layout and shared constants
//! - Component registry and entity index
//! - Chunked column storage and archetypes
//! - The archetype graph
//! - Queries and deferred commands
//! - The `World` that ties them together
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod lookup;
pub mod component;
pub mod entity;
pub mod storage;
pub mod archetype;
pub mod graph;
pub mod query;
pub mod commands;
pub mod world;
