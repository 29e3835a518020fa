//! Compiled endpoints.
//!
//! An [`Endpoint`] is the immutable, per-route product of the build: method
//! and full path, the pre-execute hooks, the skip-filtered [`Chain`], the
//! resolved finalizer, and the layered metadata view. Endpoints are shared
//! behind `Arc` and dispatched concurrently.

use std::sync::Arc;

use http::Method;
use trellis_core::DispatchError;

use crate::chain::Chain;
use crate::driver;
use crate::handler::PreExecute;
use crate::metadata::MetadataChain;
use crate::outcome::Finalizer;
use crate::state::RequestState;

/// One compiled, dispatchable route.
pub struct Endpoint {
    method: Method,
    path: String,
    name: String,
    pre_executes: Vec<PreExecute>,
    chain: Chain,
    finalizer: Finalizer,
    metadata: MetadataChain,
}

impl Endpoint {
    pub(crate) fn new(
        method: Method,
        path: String,
        name: String,
        pre_executes: Vec<PreExecute>,
        chain: Chain,
        finalizer: Finalizer,
        metadata: MetadataChain,
    ) -> Self {
        Self {
            method,
            path,
            name,
            pre_executes,
            chain,
            finalizer,
            metadata,
        }
    }

    /// Returns the endpoint's method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the endpoint's full path, prefixes included.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the endpoint's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the layered metadata view, most specific scope winning.
    #[must_use]
    pub fn metadata(&self) -> &MetadataChain {
        &self.metadata
    }

    pub(crate) fn pre_executes(&self) -> &[PreExecute] {
        &self.pre_executes
    }

    pub(crate) fn chain(&self) -> &Chain {
        &self.chain
    }

    pub(crate) fn finalizer(&self) -> &Finalizer {
        &self.finalizer
    }

    /// Dispatches one request through this endpoint with fresh storage.
    ///
    /// # Errors
    ///
    /// Fails only when the finalizer fails; every in-chain raise resolves
    /// into a reply instead.
    pub async fn dispatch(self: &Arc<Self>) -> Result<(), DispatchError> {
        driver::dispatch(self, None).await
    }

    /// Dispatches one request over storage the caller pre-populated, as a
    /// transport adapter does with its native request handles.
    ///
    /// # Errors
    ///
    /// Fails only when the finalizer fails.
    pub async fn dispatch_with_storage(
        self: &Arc<Self>,
        storage: trellis_core::RequestStorage,
    ) -> Result<(), DispatchError> {
        driver::dispatch(self, Some(storage)).await
    }

    /// Runs the pre-execute hooks and the chain over an externally owned
    /// state, then hands back the state for inspection. The finalizer still
    /// runs; this exists for embedding and tests.
    ///
    /// # Errors
    ///
    /// Fails only when the finalizer fails.
    pub async fn dispatch_on(
        self: &Arc<Self>,
        state: &RequestState,
    ) -> Result<(), DispatchError> {
        driver::dispatch_on(self, state).await
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("pre_executes", &self.pre_executes.len())
            .field("chain", &self.chain)
            .finish()
    }
}
