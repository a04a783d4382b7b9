//! Two-tier id lookup table.
//!
//! Component ids are handed out densely from 1, so almost every id a hot path
//! sees is small. [`FastIdLookup`] serves ids below [`FAST_LOOKUP_CAP`] from
//! a dense, lazily grown table and routes everything else (large ids and all
//! relation pairs) to a `HashMap`.
//!
//! The registry keys component entries with it and every archetype keys its
//! column slots with it.

use std::collections::HashMap;

use crate::engine::types::{ComponentID, FAST_LOOKUP_CAP};


/// Map from [`ComponentID`] to `T` with a dense tier for small ids.
#[derive(Debug, Clone)]
pub struct FastIdLookup<T> {
    fast: Vec<Option<T>>,
    fast_count: usize,
    slow: HashMap<ComponentID, T>,
}

impl<T> Default for FastIdLookup<T> {
    fn default() -> Self {
        Self { fast: Vec::new(), fast_count: 0, slow: HashMap::new() }
    }
}

impl<T> FastIdLookup<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn is_fast(id: ComponentID) -> bool {
        id < FAST_LOOKUP_CAP as ComponentID
    }

    /// Inserts `value` under `id`, returning the previous value.
    pub fn insert(&mut self, id: ComponentID, value: T) -> Option<T> {
        if Self::is_fast(id) {
            let index = id as usize;
            if index >= self.fast.len() {
                self.fast.resize_with(index + 1, || None);
            }
            let previous = self.fast[index].replace(value);
            if previous.is_none() {
                self.fast_count += 1;
            }
            previous
        } else {
            self.slow.insert(id, value)
        }
    }

    /// Returns the value stored under `id`.
    #[inline]
    pub fn get(&self, id: ComponentID) -> Option<&T> {
        if Self::is_fast(id) {
            self.fast.get(id as usize).and_then(Option::as_ref)
        } else {
            self.slow.get(&id)
        }
    }

    /// Returns the value stored under `id` mutably.
    #[inline]
    pub fn get_mut(&mut self, id: ComponentID) -> Option<&mut T> {
        if Self::is_fast(id) {
            self.fast.get_mut(id as usize).and_then(Option::as_mut)
        } else {
            self.slow.get_mut(&id)
        }
    }

    /// Returns `true` if `id` is present.
    #[inline]
    pub fn contains(&self, id: ComponentID) -> bool {
        self.get(id).is_some()
    }

    /// Removes and returns the value stored under `id`.
    pub fn remove(&mut self, id: ComponentID) -> Option<T> {
        if Self::is_fast(id) {
            let removed = self.fast.get_mut(id as usize).and_then(Option::take);
            if removed.is_some() {
                self.fast_count -= 1;
            }
            removed
        } else {
            self.slow.remove(&id)
        }
    }

    /// Number of stored entries across both tiers.
    #[inline]
    pub fn len(&self) -> usize {
        self.fast_count + self.slow.len()
    }

    /// Returns `true` if no entry is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
