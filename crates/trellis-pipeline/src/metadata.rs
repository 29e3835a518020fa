//! Scope metadata and the layered lookup chain.
//!
//! Every scope carries a [`Metadata`] map of type-erased values keyed by
//! [`StorageKey`]. At build time the scopes an endpoint inherits from are
//! assembled root-to-leaf into a [`MetadataChain`]; lookups walk the chain
//! leaf-to-root, so the most specific scope wins without ever copying parent
//! entries into child maps.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use trellis_core::{StorageKey, StoredValue};

/// One scope's metadata map.
#[derive(Default, Clone)]
pub struct Metadata {
    entries: HashMap<String, StoredValue>,
}

impl Metadata {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under the given key, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: &dyn StorageKey, value: T) {
        self.insert_raw(key, Arc::new(value));
    }

    /// Stores an already type-erased value under the given key.
    pub fn insert_raw(&mut self, key: &dyn StorageKey, value: StoredValue) {
        self.entries.insert(key.storage_key(), value);
    }

    /// Returns the value under the given key, downcast to `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &dyn StorageKey) -> Option<Arc<T>> {
        self.get_raw(key).and_then(|raw| raw.downcast::<T>().ok())
    }

    /// Returns the type-erased value under the given key.
    #[must_use]
    pub fn get_raw(&self, key: &dyn StorageKey) -> Option<StoredValue> {
        self.get_rendered(&key.storage_key())
    }

    pub(crate) fn get_rendered(&self, rendered: &str) -> Option<StoredValue> {
        self.entries.get(rendered).map(Arc::clone)
    }

    /// Reports whether the given key has a value.
    #[must_use]
    pub fn contains(&self, key: &dyn StorageKey) -> bool {
        self.entries.contains_key(&key.storage_key())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The read-only metadata view of a compiled endpoint.
///
/// Layers are ordered root-to-leaf; lookups walk them leaf-to-root and return
/// the first hit, so a route-level entry shadows a controller-level entry,
/// which shadows an application-level one.
#[derive(Clone)]
pub struct MetadataChain {
    layers: Vec<Arc<Metadata>>,
}

impl MetadataChain {
    pub(crate) fn new(layers: Vec<Arc<Metadata>>) -> Self {
        Self { layers }
    }

    /// Returns the most specific value under the given key, downcast to `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &dyn StorageKey) -> Option<Arc<T>> {
        self.get_raw(key).and_then(|raw| raw.downcast::<T>().ok())
    }

    /// Returns the most specific type-erased value under the given key.
    #[must_use]
    pub fn get_raw(&self, key: &dyn StorageKey) -> Option<StoredValue> {
        let rendered = key.storage_key();
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get_rendered(&rendered))
    }

    /// Reports whether any layer has a value under the given key.
    #[must_use]
    pub fn contains(&self, key: &dyn StorageKey) -> bool {
        self.get_raw(key).is_some()
    }

    /// Returns the number of layers in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl fmt::Debug for MetadataChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataChain")
            .field("layers", &self.layers)
            .finish()
    }
}
