//! Per-request key/value storage.
//!
//! [`RequestStorage`] is a concurrency-safe, type-erased map created once per
//! request. Pipeline layers use it to pass data to each other — a transport
//! adapter stores its native request/response handles here so inner layers can
//! retrieve them without knowing which transport is in play.
//!
//! Keys come in two addressing modes to avoid accidental collisions between
//! independently authored components:
//!
//! - [`NamedKey`] — an explicit, stable string key
//! - [`TypeKey`] — a token derived from a Rust type, for "the `T` of this
//!   request" style lookups
//!
//! Typed accessors perform a checked downcast and report a
//! [`StorageError`](crate::StorageError) on mismatch rather than panicking.

use crate::error::StorageError;
use dashmap::DashMap;
use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type-erased value held by [`RequestStorage`].
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// A key addressing one slot of [`RequestStorage`].
///
/// The two built-in implementations are [`NamedKey`] and [`TypeKey`].
/// Implementations must produce a stable string for the lifetime of the
/// process; the string is the identity of the slot.
pub trait StorageKey {
    /// Returns the stable string form of this key.
    fn storage_key(&self) -> String;
}

/// An explicit string-addressed storage key.
///
/// The rendered form is decorated (`__name__`) so a named key can never
/// collide with a [`TypeKey`], whose rendered form is a Rust type path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedKey(String);

impl NamedKey {
    /// Creates a named key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the undecorated name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl StorageKey for NamedKey {
    fn storage_key(&self) -> String {
        format!("__{}__", self.0)
    }
}

/// A storage key derived from a Rust type.
///
/// Two `TypeKey`s address the same slot exactly when they are instantiated
/// with the same type. This is the addressing mode used for "the request's
/// `T`" lookups, e.g. a transport adapter storing its response writer.
pub struct TypeKey<T: ?Sized>(PhantomData<fn() -> T>);

impl<T: ?Sized> TypeKey<T> {
    /// Creates the key for type `T`.
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: ?Sized> Default for TypeKey<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for TypeKey<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Copy for TypeKey<T> {}

impl<T: ?Sized> fmt::Debug for TypeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&type_name::<T>()).finish()
    }
}

impl<T: ?Sized> StorageKey for TypeKey<T> {
    fn storage_key(&self) -> String {
        type_name::<T>().to_string()
    }
}

/// Concurrency-safe per-request key/value store.
///
/// Created once per request by the execution driver (or supplied by the
/// transport adapter), cleared on every exit path, and optionally snapshotted
/// for detached post-request use.
///
/// # Example
///
/// ```
/// use trellis_core::{NamedKey, RequestStorage};
///
/// let storage = RequestStorage::new();
/// storage.store(&NamedKey::new("tenant"), "acme".to_string());
///
/// let tenant = storage.load::<String>(&NamedKey::new("tenant")).unwrap();
/// assert_eq!(*tenant, "acme");
/// ```
#[derive(Default)]
pub struct RequestStorage {
    entries: DashMap<String, StoredValue>,
}

impl RequestStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under the given key, replacing any previous value.
    pub fn store<T: Send + Sync + 'static>(&self, key: &dyn StorageKey, value: T) {
        self.store_raw(key, Arc::new(value));
    }

    /// Stores an already type-erased value under the given key.
    pub fn store_raw(&self, key: &dyn StorageKey, value: StoredValue) {
        self.entries.insert(key.storage_key(), value);
    }

    /// Loads the value stored under the given key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the key has no value and
    /// [`StorageError::TypeMismatch`] when the stored value is not a `T`.
    pub fn load<T: Send + Sync + 'static>(
        &self,
        key: &dyn StorageKey,
    ) -> Result<Arc<T>, StorageError> {
        let raw = self.load_raw(key).ok_or_else(|| StorageError::NotFound {
            key: key.storage_key(),
        })?;
        raw.downcast::<T>().map_err(|_| StorageError::TypeMismatch {
            key: key.storage_key(),
            expected: type_name::<T>(),
        })
    }

    /// Loads the type-erased value stored under the given key.
    #[must_use]
    pub fn load_raw(&self, key: &dyn StorageKey) -> Option<StoredValue> {
        self.entries
            .get(&key.storage_key())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Loads the value under the given key, storing `value` first if the slot
    /// is empty. The check and the insert are one atomic operation.
    ///
    /// Returns the resident value and whether it was already present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TypeMismatch`] when a value was present but is
    /// not a `T`.
    pub fn load_or_store<T: Send + Sync + 'static>(
        &self,
        key: &dyn StorageKey,
        value: T,
    ) -> Result<(Arc<T>, bool), StorageError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(key.storage_key()) {
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                drop(entry);
                existing
                    .downcast::<T>()
                    .map(|resident| (resident, true))
                    .map_err(|_| StorageError::TypeMismatch {
                        key: key.storage_key(),
                        expected: type_name::<T>(),
                    })
            }
            Entry::Vacant(entry) => {
                let stored = Arc::new(value);
                let erased: StoredValue = Arc::clone(&stored) as StoredValue;
                entry.insert(erased);
                Ok((stored, false))
            }
        }
    }

    /// Removes the value stored under the given key, returning whether a
    /// value was present.
    pub fn delete(&self, key: &dyn StorageKey) -> bool {
        self.entries.remove(&key.storage_key()).is_some()
    }

    /// Removes every stored value.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Visits every key/value pair currently stored.
    ///
    /// The iteration order is unspecified. Mutating the storage from inside
    /// the callback may deadlock; snapshot first when that is needed.
    pub fn for_each(&self, mut f: impl FnMut(&str, &StoredValue)) {
        for entry in &self.entries {
            f(entry.key(), entry.value());
        }
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produces an independent shallow copy for detached use after the
    /// owning request is released.
    ///
    /// Later mutation of the snapshot or the original never affects the
    /// other; values referenced through `Arc` remain shared.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        let entries = DashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            entries.insert(entry.key().clone(), Arc::clone(entry.value()));
        }
        Self { entries }
    }
}

impl fmt::Debug for RequestStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("RequestStorage").field("keys", &keys).finish()
    }
}
