//! The execution driver.
//!
//! `dispatch` runs one request through an endpoint: create (or adopt) the
//! request state, bind the endpoint, run the pre-execute hooks, execute the
//! chain, fill an empty response slot with a fallback fault, and hand the
//! reply to the finalizer. Request storage is cleared on every exit path,
//! including cancellation, via a drop guard.

use std::sync::Arc;

use tracing::{debug_span, error, trace, warn, Instrument};
use trellis_core::{Code, DispatchError, Reply, RequestStorage, Response};

use crate::endpoint::Endpoint;
use crate::state::RequestState;

/// Where a request is in its lifecycle; emitted on the trace log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// State created, nothing run yet.
    Created,
    /// Pre-execute hooks are running.
    PreExecuting,
    /// The middleware stage is active.
    MiddlewareActive,
    /// Guards are being evaluated.
    GuardEvaluating,
    /// The interceptor stage is active.
    Intercepting,
    /// Handler steps are running.
    HandlerRunning,
    /// The chain settled and the reply is resolved.
    ResponseResolved,
    /// The finalizer delivered the reply.
    Finalized,
    /// The finalizer failed.
    Failed,
}

impl ExecutionState {
    /// Returns the lowercase wire form of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PreExecuting => "pre_executing",
            Self::MiddlewareActive => "middleware_active",
            Self::GuardEvaluating => "guard_evaluating",
            Self::Intercepting => "intercepting",
            Self::HandlerRunning => "handler_running",
            Self::ResponseResolved => "response_resolved",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clears request storage when the dispatch future is dropped, completed or
/// not.
struct StorageGuard<'a>(&'a RequestState);

impl Drop for StorageGuard<'_> {
    fn drop(&mut self) {
        self.0.storage().clear();
    }
}

pub(crate) async fn dispatch(
    endpoint: &Arc<Endpoint>,
    storage: Option<RequestStorage>,
) -> Result<(), DispatchError> {
    let state = storage.map_or_else(RequestState::new, RequestState::with_storage);
    dispatch_on(endpoint, &state).await
}

pub(crate) async fn dispatch_on(
    endpoint: &Arc<Endpoint>,
    state: &RequestState,
) -> Result<(), DispatchError> {
    let _cleanup = StorageGuard(state);
    let span = debug_span!(
        "dispatch",
        endpoint = endpoint.name(),
        request_id = %state.id()
    );

    async move {
        trace!(stage = %ExecutionState::Created, "request accepted");
        state.bind_endpoint(Arc::clone(endpoint));

        trace!(stage = %ExecutionState::PreExecuting, hooks = endpoint.pre_executes().len());
        for hook in endpoint.pre_executes() {
            hook(state).await;
        }

        endpoint.chain().execute(state).await;

        let reply = state.take_reply().unwrap_or_else(|| {
            warn!("chain settled without a reply; substituting an unknown fault");
            Reply::Structured(
                Response::failure(Code::Unknown).with(|r| r.set_message("no response produced")),
            )
        });
        trace!(stage = %ExecutionState::ResponseResolved, status = %reply.status());

        match (endpoint.finalizer())(state, reply).await {
            Ok(()) => {
                trace!(stage = %ExecutionState::Finalized, "reply delivered");
                Ok(())
            }
            Err(source) => {
                error!(stage = %ExecutionState::Failed, error = %source, "finalizer failed");
                Err(DispatchError::Finalize {
                    endpoint: endpoint.name().to_string(),
                    source,
                })
            }
        }
    }
    .instrument(span)
    .await
}
