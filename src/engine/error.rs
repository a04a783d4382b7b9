//! Error types for the component registry, column storage and world API.
//!
//! Each error type models a single failure mode and carries enough context to
//! make a log line actionable. All of them implement [`fmt::Display`] and
//! [`std::error::Error`], and convert into the aggregate [`ECSError`] through
//! `From`, so fallible paths can use `?` end to end.
//!
//! ## Two channels
//! The store distinguishes two kinds of failure:
//!
//! * **Contract violations**: a dead or unknown entity, a missing component
//!   on `get`, a size conflict on re-registration, a tag used as if it carried
//!   data. These indicate caller error. The panicking API reports them
//!   through [`violation`], which logs at `error` level and panics with the
//!   `Display` text of the error.
//! * **Internal inconsistencies**: column type mismatches or misaligned rows
//!   during an archetype move ([`ColumnError`], [`MoveError`]). The store
//!   trusts its own invariants, so the world escalates these through
//!   [`violation`] as well instead of continuing on corrupted storage.
//!
//! The `try_*` accessors on `World` surface the first channel as
//! [`ECSResult`] for callers that would rather branch than unwind.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is short and meant for logs.
//! * [`fmt::Debug`] (derived) keeps full structure for diagnostics.

use std::fmt;
use std::any::TypeId;

use crate::engine::entity::Entity;
use crate::engine::types::{ComponentID, RowID};


/// Returned when the entity index cannot hand out another slot.
///
/// ### Fields
/// * `entities_needed`: Number of slots the operation needed in total.
/// * `capacity`: Upper bound that prevented the operation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {

    /// Total slots the operation attempted to allocate.
    pub entities_needed: u64,

    /// Current capacity limiting the operation.
    pub capacity: u64,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity limit reached ({} needed; capacity {})",
            self.entities_needed, self.capacity
        )
    }
}

impl std::error::Error for CapacityError {}

/// Returned when an [`Entity`] handle is no longer valid, typically because it
/// was despawned and its slot recycled under a newer generation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {

    /// The offending handle.
    pub entity: Entity,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale or dead entity reference {}", self.entity)
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when an entity does not carry the requested component.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingComponentError {

    /// Entity that was inspected.
    pub entity: Entity,

    /// Component that was requested.
    pub component_id: ComponentID,

    /// Type name of the requested component.
    pub name: &'static str,
}

impl fmt::Display for MissingComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity {} has no component {} ({})",
            self.entity, self.name, self.component_id
        )
    }
}

impl std::error::Error for MissingComponentError {}

/// Returned when a zero-size tag is accessed as if it carried data.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAccessError {

    /// Tag id that was accessed.
    pub component_id: ComponentID,

    /// Type name of the tag.
    pub name: &'static str,
}

impl fmt::Display for TagAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component {} ({}) is a tag and carries no data", self.name, self.component_id)
    }
}

impl std::error::Error for TagAccessError {}

/// Returned when a component id was never registered.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnregisteredComponentError {

    /// The unknown id.
    pub component_id: ComponentID,
}

impl fmt::Display for UnregisteredComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component not found with id {}", self.component_id)
    }
}

impl std::error::Error for UnregisteredComponentError {}

/// Returned when an id is registered again with a size that differs from the
/// size recorded at first registration.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeConflictError {

    /// Id being registered.
    pub component_id: ComponentID,

    /// Size recorded for the id.
    pub registered: usize,

    /// Size supplied by the conflicting registration.
    pub requested: usize,
}

impl fmt::Display for SizeConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "component {} re-registered with size {} (registered size {})",
            self.component_id, self.requested, self.registered
        )
    }
}

impl std::error::Error for SizeConflictError {}

/// Returned when a column write receives a value of the wrong element type.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {

    /// Element type declared by the column.
    pub expected: TypeId,

    /// Dynamic type of the provided value.
    pub actual: TypeId,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type mismatch: expected {:?}, actual {:?}", self.expected, self.actual)
    }
}

impl std::error::Error for TypeMismatchError {}

/// Failures of a single typed column inside a chunk.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnError {

    /// The dynamic type of a value or peer column did not match.
    TypeMismatch(TypeMismatchError),

    /// A row outside `[0, len)` was addressed.
    RowOutOfBounds {
        /// Offset that was addressed.
        row: usize,

        /// Number of valid rows in the column.
        len: usize,
    },

    /// A swap-remove asked for the last row of an empty tail column.
    EmptyTail,
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnError::TypeMismatch(e) => write!(f, "{e}"),
            ColumnError::RowOutOfBounds { row, len } => {
                write!(f, "row {} out of bounds (column length {})", row, len)
            }
            ColumnError::EmptyTail => f.write_str("tail column is empty"),
        }
    }
}

impl std::error::Error for ColumnError {}

impl From<TypeMismatchError> for ColumnError {
    fn from(e: TypeMismatchError) -> Self { ColumnError::TypeMismatch(e) }
}

/// Errors raised while moving or removing a row between archetypes.
///
/// ## Notes
/// These indicate violated storage invariants rather than recoverable
/// conditions; the world escalates them to a panic.

#[derive(Debug)]
pub enum MoveError {

    /// A column operation failed for the given component.
    Column {
        /// Component whose column failed.
        component_id: ComponentID,

        /// Underlying column error.
        source_error: ColumnError,
    },

    /// A destination-only column had no value to receive.
    MissingInsertedValue {
        /// Component that needed a value.
        component_id: ComponentID,
    },

    /// The addressed row is outside the archetype.
    RowOutOfBounds {
        /// Row that was addressed.
        row: RowID,

        /// Live rows in the archetype.
        count: usize,
    },

    /// After the move the destination row held a different entity.
    RowMismatch {
        /// Entity that was moved.
        expected: Entity,

        /// Entity found at the destination row.
        found: Entity,
    },
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::Column { component_id, source_error } => write!(
                f,
                "column {} failed during archetype move: {}",
                component_id, source_error
            ),
            MoveError::MissingInsertedValue { component_id } => write!(
                f,
                "destination column {} received no value",
                component_id
            ),
            MoveError::RowOutOfBounds { row, count } => write!(
                f,
                "row {} out of bounds (archetype holds {} rows)",
                row, count
            ),
            MoveError::RowMismatch { expected, found } => write!(
                f,
                "archetype move misaligned: expected {} at destination row, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for MoveError {}

/// Aggregate error of the world API.

#[derive(Debug)]
pub enum ECSError {

    /// Entity index exhausted.
    Capacity(CapacityError),

    /// Dead or stale entity handle.
    StaleEntity(StaleEntityError),

    /// Requested component is not on the entity.
    MissingComponent(MissingComponentError),

    /// Tag used as data.
    TagAccess(TagAccessError),

    /// Id was never registered.
    UnregisteredComponent(UnregisteredComponentError),

    /// Conflicting re-registration.
    SizeConflict(SizeConflictError),

    /// Column-level failure.
    Column(ColumnError),

    /// Archetype move failure.
    Move(MoveError),
}

impl fmt::Display for ECSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ECSError::Capacity(e) => write!(f, "{e}"),
            ECSError::StaleEntity(e) => write!(f, "{e}"),
            ECSError::MissingComponent(e) => write!(f, "{e}"),
            ECSError::TagAccess(e) => write!(f, "{e}"),
            ECSError::UnregisteredComponent(e) => write!(f, "{e}"),
            ECSError::SizeConflict(e) => write!(f, "{e}"),
            ECSError::Column(e) => write!(f, "{e}"),
            ECSError::Move(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ECSError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ECSError::Capacity(e) => Some(e),
            ECSError::StaleEntity(e) => Some(e),
            ECSError::MissingComponent(e) => Some(e),
            ECSError::TagAccess(e) => Some(e),
            ECSError::UnregisteredComponent(e) => Some(e),
            ECSError::SizeConflict(e) => Some(e),
            ECSError::Column(e) => Some(e),
            ECSError::Move(e) => Some(e),
        }
    }
}

impl From<CapacityError> for ECSError {
    fn from(e: CapacityError) -> Self { ECSError::Capacity(e) }
}
impl From<StaleEntityError> for ECSError {
    fn from(e: StaleEntityError) -> Self { ECSError::StaleEntity(e) }
}
impl From<MissingComponentError> for ECSError {
    fn from(e: MissingComponentError) -> Self { ECSError::MissingComponent(e) }
}
impl From<TagAccessError> for ECSError {
    fn from(e: TagAccessError) -> Self { ECSError::TagAccess(e) }
}
impl From<UnregisteredComponentError> for ECSError {
    fn from(e: UnregisteredComponentError) -> Self { ECSError::UnregisteredComponent(e) }
}
impl From<SizeConflictError> for ECSError {
    fn from(e: SizeConflictError) -> Self { ECSError::SizeConflict(e) }
}
impl From<ColumnError> for ECSError {
    fn from(e: ColumnError) -> Self { ECSError::Column(e) }
}
impl From<MoveError> for ECSError {
    fn from(e: MoveError) -> Self { ECSError::Move(e) }
}

/// Result alias used by the fallible world API.
pub type ECSResult<T> = Result<T, ECSError>;

/// Reports a contract violation or storage corruption and aborts the
/// current operation.
///
/// ## Panics
/// Always. The message is the `Display` text of `error`.

#[cold]
#[track_caller]
pub fn violation<E: fmt::Display>(error: E) -> ! {
    log::error!("ecs contract violation: {error}");
    panic!("{error}")
}
