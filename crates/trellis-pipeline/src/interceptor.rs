//! Interceptors: wrapping layers inward of the guards.
//!
//! An interceptor has the same continuation-passing shape as a middleware but
//! runs only for admitted requests. This is the seam for logic that should
//! see the handler's outcome but must not pay for denied requests, such as
//! response decoration or result caching.

use crate::chain::Next;
use crate::outcome::{BoxFuture, Outcome};
use crate::skip::LayerId;
use crate::state::RequestState;

/// A layer wrapping the handler steps of an endpoint, inward of the guards.
pub trait Interceptor: Send + Sync + 'static {
    /// The interceptor's skippable identity; anonymous interceptors return
    /// `None` and can never be skipped.
    fn id(&self) -> Option<LayerId> {
        None
    }

    /// Runs the layer. Call `next.run(state).await` to continue inward.
    fn intercept<'a>(&'a self, state: &'a RequestState, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// Adapts a closure into an [`Interceptor`].
pub struct InterceptorFn<F> {
    id: Option<LayerId>,
    func: F,
}

impl<F> InterceptorFn<F>
where
    F: for<'a> Fn(&'a RequestState, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    /// Wraps an anonymous interceptor closure.
    pub fn new(func: F) -> Self {
        Self { id: None, func }
    }

    /// Wraps an interceptor closure with a skippable identity.
    pub fn with_id(id: LayerId, func: F) -> Self {
        Self { id: Some(id), func }
    }
}

impl<F> Interceptor for InterceptorFn<F>
where
    F: for<'a> Fn(&'a RequestState, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn id(&self) -> Option<LayerId> {
        self.id
    }

    fn intercept<'a>(&'a self, state: &'a RequestState, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (self.func)(state, next)
    }
}
