//! Chunked column storage and type-erased column access.
//!
//! An archetype stores its rows in [`Chunk`]s of at most [`CHUNK_CAP`] rows.
//! Each chunk holds one [`Column<T>`] per stored (non-tag) component plus the
//! entity id of every row. All arrays in a chunk have the same length, the
//! chunk's `count`.
//!
//! # Storage model
//!
//! ```text
//! Chunk { entities: Vec<Entity>, columns: Vec<Box<dyn ErasedColumn>> }
//! Column<T> { data: Vec<T>, added: Vec<Tick>, changed: Vec<Tick> }
//! ```
//!
//! Every column reserves `CHUNK_CAP` slots up front, so a chunk's arrays
//! never reallocate while it fills and slices handed out for iteration stay
//! contiguous.
//!
//! # Change ticks
//!
//! Each stored value carries two ticks:
//!
//! - `added`: the world tick at which the component was attached to the
//!   entity,
//! - `changed`: the world tick of the last write.
//!
//! Both travel with the value when a row moves between archetypes.
//!
//! # Swap-remove across chunks
//!
//! Removing a row fills the hole with the archetype's *last* row, which may
//! live in a later chunk. [`ErasedColumn::take_row`] therefore accepts an
//! optional `tail` column: when present the hole is filled from the tail's
//! last value; otherwise the column swap-removes within itself.
//!
//! # Type erasure
//!
//! [`ErasedColumn`] lets archetypes hold heterogeneous columns. Typed access
//! goes through `as_any` downcasts; cross-column moves verify that both
//! columns have the same element type and report [`ColumnError::TypeMismatch`]
//! otherwise.

use std::any::{type_name, Any, TypeId};
use std::mem;

use crate::engine::component::ColumnFactory;
use crate::engine::entity::Entity;
use crate::engine::error::{ColumnError, TypeMismatchError};
use crate::engine::types::{Tick, CHUNK_CAP};


/// A dense array of `T` with parallel added/changed tick arrays.
pub struct Column<T> {
    data: Vec<T>,
    added: Vec<Tick>,
    changed: Vec<Tick>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Column<T> {
    /// Creates an empty column with room for a full chunk.
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(CHUNK_CAP),
            added: Vec::with_capacity(CHUNK_CAP),
            changed: Vec::with_capacity(CHUNK_CAP),
        }
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the column is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a freshly attached value; both ticks are set to `tick`.
    #[inline]
    pub fn push(&mut self, value: T, tick: Tick) {
        self.push_with_ticks(value, tick, tick);
    }

    /// Appends a value carrying existing ticks.
    #[inline]
    pub fn push_with_ticks(&mut self, value: T, added: Tick, changed: Tick) {
        debug_assert!(self.data.len() < CHUNK_CAP, "column exceeded chunk capacity");
        self.data.push(value);
        self.added.push(added);
        self.changed.push(changed);
    }

    /// Removes the last value with its ticks.
    #[inline]
    pub fn pop(&mut self) -> Option<(T, Tick, Tick)> {
        let value = self.data.pop()?;
        let added = self.added.pop().unwrap_or_default();
        let changed = self.changed.pop().unwrap_or_default();
        Some((value, added, changed))
    }

    /// Overwrites the value at `row` and stamps its changed tick.
    #[inline]
    pub fn write(&mut self, row: usize, value: T, tick: Tick) {
        self.data[row] = value;
        self.changed[row] = tick;
    }

    /// Returns the stored values.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the stored values mutably. Ticks are not touched.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Returns the value at `row`.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.data.get(row)
    }

    /// Returns the value at `row` mutably.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.data.get_mut(row)
    }

    /// Added ticks, parallel to the values.
    #[inline]
    pub fn added_ticks(&self) -> &[Tick] {
        &self.added
    }

    /// Changed ticks, parallel to the values.
    #[inline]
    pub fn changed_ticks(&self) -> &[Tick] {
        &self.changed
    }

    /// Splits the column into its values and its changed ticks.
    #[inline]
    pub fn values_and_changed_mut(&mut self) -> (&mut [T], &mut [Tick]) {
        (&mut self.data, &mut self.changed)
    }
}

fn downcast_column_mut<T: 'static>(column: &mut dyn ErasedColumn) -> Result<&mut Column<T>, ColumnError> {
    let actual = column.element_type_id();
    column
        .as_any_mut()
        .downcast_mut::<Column<T>>()
        .ok_or(ColumnError::TypeMismatch(TypeMismatchError { expected: TypeId::of::<T>(), actual }))
}

/// Dynamically typed interface to a [`Column<T>`].
///
/// ## Purpose
/// Lets a chunk own columns of heterogeneous element types and lets the
/// archetype layer move rows between chunks without knowing `T`.
///
/// ## Contract
/// - `as_any` / `as_any_mut` must return the concrete `Column<T>` so typed
///   downcasts succeed.
/// - Operations taking a peer column (`tail`, `dest`) must fail with
///   [`ColumnError::TypeMismatch`] rather than touch a peer of another type.

pub trait ErasedColumn: Any + Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if the column is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an immutable type-erased reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Type name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Appends a boxed value as a fresh attach at `tick`.
    fn push_dyn(&mut self, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError>;

    /// Overwrites the value at `row` with a boxed value and stamps `tick`.
    fn write_dyn(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError>;

    /// Removes the value at `row`.
    ///
    /// The hole is filled by the last value of `tail` when given, or by this
    /// column's own last value otherwise. The removed value and its ticks are
    /// appended to `dest` when given and dropped otherwise.
    fn take_row(
        &mut self,
        row: usize,
        tail: Option<&mut dyn ErasedColumn>,
        dest: Option<&mut dyn ErasedColumn>,
    ) -> Result<(), ColumnError>;

    /// Added ticks, parallel to the values.
    fn added_ticks(&self) -> &[Tick];

    /// Changed ticks, parallel to the values.
    fn changed_ticks(&self) -> &[Tick];

    /// Changed ticks, mutably.
    fn changed_ticks_mut(&mut self) -> &mut [Tick];
}

impl<T: 'static + Send + Sync> ErasedColumn for Column<T> {
    fn len(&self) -> usize { self.data.len() }

    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn element_type_id(&self) -> TypeId { TypeId::of::<T>() }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }

    fn push_dyn(&mut self, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError> {
        let actual = (*value).type_id();
        let value = value
            .downcast::<T>()
            .map_err(|_| TypeMismatchError { expected: TypeId::of::<T>(), actual })?;
        self.push(*value, tick);
        Ok(())
    }

    fn write_dyn(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError> {
        if row >= self.data.len() {
            return Err(ColumnError::RowOutOfBounds { row, len: self.data.len() });
        }
        let actual = (*value).type_id();
        let value = value
            .downcast::<T>()
            .map_err(|_| TypeMismatchError { expected: TypeId::of::<T>(), actual })?;
        self.write(row, *value, tick);
        Ok(())
    }

    fn take_row(
        &mut self,
        row: usize,
        tail: Option<&mut dyn ErasedColumn>,
        dest: Option<&mut dyn ErasedColumn>,
    ) -> Result<(), ColumnError> {
        if row >= self.data.len() {
            return Err(ColumnError::RowOutOfBounds { row, len: self.data.len() });
        }

        // resolve peers before touching self so a mismatch leaves storage intact
        let tail = match tail {
            Some(tail) => Some(downcast_column_mut::<T>(tail)?),
            None => None,
        };
        let dest = match dest {
            Some(dest) => Some(downcast_column_mut::<T>(dest)?),
            None => None,
        };

        let (value, added, changed) = match tail {
            None => (
                self.data.swap_remove(row),
                self.added.swap_remove(row),
                self.changed.swap_remove(row),
            ),
            Some(tail) => {
                let (last, last_added, last_changed) = tail.pop().ok_or(ColumnError::EmptyTail)?;
                (
                    mem::replace(&mut self.data[row], last),
                    mem::replace(&mut self.added[row], last_added),
                    mem::replace(&mut self.changed[row], last_changed),
                )
            }
        };

        if let Some(dest) = dest {
            dest.push_with_ticks(value, added, changed);
        }
        Ok(())
    }

    fn added_ticks(&self) -> &[Tick] { &self.added }
    fn changed_ticks(&self) -> &[Tick] { &self.changed }
    fn changed_ticks_mut(&mut self) -> &mut [Tick] { &mut self.changed }
}

/// A fixed-capacity page of rows inside an archetype.
///
/// Rows `[0, count)` are valid in every array of the chunk.

pub struct Chunk {
    entities: Vec<Entity>,
    columns: Vec<Box<dyn ErasedColumn>>,
}

impl Chunk {
    /// Creates an empty chunk with one column per factory.
    pub fn new(factories: &[ColumnFactory]) -> Self {
        Self {
            entities: Vec::with_capacity(CHUNK_CAP),
            columns: factories.iter().map(|factory| factory()).collect(),
        }
    }

    /// Number of valid rows.
    #[inline]
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the chunk holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if no further row fits.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() >= CHUNK_CAP
    }

    /// Entity ids of the valid rows.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of stored columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Type-erased column at `index`.
    #[inline]
    pub fn column_dyn(&self, index: usize) -> &dyn ErasedColumn {
        self.columns[index].as_ref()
    }

    /// Type-erased column at `index`, mutably.
    #[inline]
    pub fn column_dyn_mut(&mut self, index: usize) -> &mut dyn ErasedColumn {
        self.columns[index].as_mut()
    }

    /// Typed column at `index`, or `None` on a type mismatch.
    #[inline]
    pub fn column<T: 'static>(&self, index: usize) -> Option<&Column<T>> {
        self.columns.get(index)?.as_any().downcast_ref::<Column<T>>()
    }

    /// Typed column at `index` mutably, or `None` on a type mismatch.
    #[inline]
    pub fn column_mut<T: 'static>(&mut self, index: usize) -> Option<&mut Column<T>> {
        self.columns.get_mut(index)?.as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Two distinct typed columns, mutably.
    ///
    /// ## Panics
    /// Panics if `a == b`.

    pub fn column_pair_mut<A: 'static, B: 'static>(
        &mut self,
        a: usize,
        b: usize,
    ) -> Option<(&mut Column<A>, &mut Column<B>)> {
        assert_ne!(a, b, "column_pair_mut needs two distinct columns");
        if a.max(b) >= self.columns.len() { return None; }
        let (low, high) = self.columns.split_at_mut(a.max(b));
        let (first, second) = if a < b {
            (low[a].as_mut(), high[0].as_mut())
        } else {
            (high[0].as_mut(), low[b].as_mut())
        };
        Some((
            first.as_any_mut().downcast_mut::<Column<A>>()?,
            second.as_any_mut().downcast_mut::<Column<B>>()?,
        ))
    }

    #[inline]
    pub(crate) fn push_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Removes the entity id at `offset`, filling the hole from `tail`'s last
    /// id when given or from this chunk's last id otherwise. Returns the id
    /// that now occupies `offset`, if one was moved there.

    pub(crate) fn take_entity(&mut self, offset: usize, tail: Option<&mut Chunk>) -> Option<Entity> {
        match tail {
            None => {
                let last = self.entities.len().checked_sub(1)?;
                self.entities.swap_remove(offset);
                if offset < last { Some(self.entities[offset]) } else { None }
            }
            Some(tail) => {
                let moved = tail.entities.pop()?;
                self.entities[offset] = moved;
                Some(moved)
            }
        }
    }
}
