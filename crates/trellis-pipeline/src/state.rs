//! Per-request execution state.
//!
//! A [`RequestState`] is created by the driver for each dispatch and shared by
//! reference with every layer of the chain. It bundles the request's identity,
//! its [`RequestStorage`], the single response slot, and a back-reference to
//! the endpoint being executed (bound once, by the driver).

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use trellis_core::{Reply, RequestStorage, StorageError, TypeKey};
use uuid::Uuid;

use crate::endpoint::Endpoint;

/// A unique, time-ordered request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The state of one in-flight request.
///
/// Thread-safe throughout: layers hold `&RequestState` and may touch storage
/// and the response slot concurrently from spawned work.
pub struct RequestState {
    id: RequestId,
    storage: RequestStorage,
    reply: Mutex<Option<Reply>>,
    endpoint: OnceLock<Arc<Endpoint>>,
}

impl RequestState {
    /// Creates a state with a fresh identity and empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(RequestStorage::new())
    }

    /// Creates a state over pre-populated storage, as a transport adapter
    /// does after stowing its native request handles.
    #[must_use]
    pub fn with_storage(storage: RequestStorage) -> Self {
        Self {
            id: RequestId::new(),
            storage,
            reply: Mutex::new(None),
            endpoint: OnceLock::new(),
        }
    }

    /// Returns the request identity.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the request's storage.
    #[must_use]
    pub fn storage(&self) -> &RequestStorage {
        &self.storage
    }

    /// Returns the endpoint this request is executing, once bound.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Arc<Endpoint>> {
        self.endpoint.get()
    }

    /// First binding wins; the driver binds before any layer runs.
    pub(crate) fn bind_endpoint(&self, endpoint: Arc<Endpoint>) {
        let _ = self.endpoint.set(endpoint);
    }

    /// Fills the response slot, replacing any previous reply.
    pub fn set_reply(&self, reply: impl Into<Reply>) {
        *self.reply.lock() = Some(reply.into());
    }

    /// Returns a clone of the current reply, if one is set.
    #[must_use]
    pub fn reply(&self) -> Option<Reply> {
        self.reply.lock().clone()
    }

    /// Applies `f` to the resident reply in place. A no-op when the slot is
    /// still empty.
    pub fn update_reply(&self, f: impl FnOnce(&mut Reply)) {
        if let Some(reply) = self.reply.lock().as_mut() {
            f(reply);
        }
    }

    pub(crate) fn take_reply(&self) -> Option<Reply> {
        self.reply.lock().take()
    }

    /// Stores `value` in request storage under its own type.
    pub fn store<T: Send + Sync + 'static>(&self, value: T) {
        self.storage.store(&TypeKey::<T>::new(), value);
    }

    /// Loads the request's `T` from storage.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] from the underlying typed lookup.
    pub fn load<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, StorageError> {
        self.storage.load::<T>(&TypeKey::<T>::new())
    }

    /// Loads the request's `T`, storing `value` first if absent.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] from the underlying typed lookup.
    pub fn load_or_store<T: Send + Sync + 'static>(
        &self,
        value: T,
    ) -> Result<(Arc<T>, bool), StorageError> {
        self.storage.load_or_store(&TypeKey::<T>::new(), value)
    }

    /// Removes the request's `T` from storage.
    pub fn delete<T: Send + Sync + 'static>(&self) -> bool {
        self.storage.delete(&TypeKey::<T>::new())
    }
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestState")
            .field("id", &self.id)
            .field("storage", &self.storage)
            .field("has_reply", &self.reply.lock().is_some())
            .field("endpoint", &self.endpoint.get().map(|e| e.name()))
            .finish()
    }
}
