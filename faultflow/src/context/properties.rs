//! Strongly-typed property storage for resilience contexts.
//!
//! Properties let callers carry per-call data into strategy predicates,
//! e.g. an operation priority that a retry predicate reads to decide
//! whether a failure is worth retrying at all.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed key into a [`PropertyBag`].
///
/// The key pairs a name with the value type at compile time, so lookups
/// never need runtime type inspection by the caller.
pub struct PropertyKey<T> {
    name: &'static str,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> PropertyKey<T> {
    /// Creates a new property key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for PropertyKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyKey<T> {}

impl<T> std::fmt::Debug for PropertyKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PropertyKey").field(&self.name).finish()
    }
}

/// A thread-safe bag of typed per-call properties.
///
/// Setting an existing key overwrites it; contexts are reused across calls
/// and callers re-populate properties before each execution.
#[derive(Default)]
pub struct PropertyBag {
    values: RwLock<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl PropertyBag {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property value.
    pub fn set<T: Send + Sync + 'static>(&self, key: PropertyKey<T>, value: T) {
        self.values.write().insert(key.name, Arc::new(value));
    }

    /// Gets a cloned property value.
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: PropertyKey<T>) -> Option<T> {
        self.values
            .read()
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Returns true if the key is present with the expected type.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self, key: PropertyKey<T>) -> bool {
        self.values
            .read()
            .get(key.name)
            .is_some_and(|value| value.is::<T>())
    }

    /// Returns the number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if no properties are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Removes all properties.
    pub fn clear(&self) {
        self.values.write().clear();
    }
}

impl std::fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyBag")
            .field("len", &self.len())
            .finish()
    }
}
