//! Vectorised references: pointers into externally owned collections are
//! written as an index instead of the object.
//!
//! Both peers hold the same collection (for example the static list of
//! artifact definitions), so the receiver can resolve the index against
//! its own copy.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::pointer::{Shared, address_of};

/// An externally owned, index-addressable set of shared nodes of type
/// `T`.
pub trait IndexedCollection<T: ?Sized>: Send + Sync {
    /// Position of `object` in the collection, if it is a member.
    fn index_of(&self, object: &Shared<T>) -> Option<u32>;

    /// The member at `index`, if in range.
    fn by_index(&self, index: u32) -> Option<Shared<T>>;
}

// ---------------------------------------------------------------------------
// SharedTable
// ---------------------------------------------------------------------------

/// A fixed list of shared nodes with an address index for O(1) lookups.
pub struct SharedTable<T: ?Sized> {
    items: Vec<Shared<T>>,
    positions: HashMap<usize, u32>,
}

impl<T: ?Sized> SharedTable<T> {
    /// # Panics
    ///
    /// Panics if `items` holds more than `u32::MAX` entries.
    pub fn new(items: Vec<Shared<T>>) -> Self {
        let positions = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let index = u32::try_from(i).expect("collection larger than u32::MAX");
                (address_of(item), index)
            })
            .collect();
        Self { items, positions }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Shared<T>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shared<T>> {
        self.items.iter()
    }
}

impl<T: ?Sized + Send + Sync> IndexedCollection<T> for SharedTable<T> {
    fn index_of(&self, object: &Shared<T>) -> Option<u32> {
        self.positions.get(&address_of(object)).copied()
    }

    fn by_index(&self, index: u32) -> Option<Shared<T>> {
        self.items.get(index as usize).cloned()
    }
}

impl<T: ?Sized> fmt::Debug for SharedTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTable")
            .field("len", &self.items.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Per-type registry of collection providers consulted when vectorised
/// references are enabled.
#[derive(Default)]
pub struct Collections {
    providers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` as the collection for pointers to `T`,
    /// replacing any earlier one.
    pub fn register<T: ?Sized + 'static>(&mut self, provider: Arc<dyn IndexedCollection<T>>) {
        tracing::debug!(element = type_name::<T>(), "registered indexed collection");
        self.providers.insert(TypeId::of::<T>(), Box::new(provider));
    }

    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<dyn IndexedCollection<T>>> {
        self.providers
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Arc<dyn IndexedCollection<T>>>()
            .cloned()
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.providers.contains_key(&TypeId::of::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for Collections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collections")
            .field("providers", &self.providers.len())
            .finish()
    }
}
