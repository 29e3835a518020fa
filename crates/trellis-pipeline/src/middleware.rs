//! Middleware: the outermost wrapping layers.
//!
//! A middleware receives a [`Next`] continuation and decides whether, and
//! with what surrounding logic, the rest of the chain runs. Because every
//! raise inward of a middleware is captured before control returns to it,
//! the code after `next.run(state).await` always executes — a middleware's
//! after-logic can rely on the response slot being settled.

use crate::chain::Next;
use crate::outcome::{BoxFuture, Outcome};
use crate::skip::LayerId;
use crate::state::RequestState;

/// A layer wrapping the whole inner chain of an endpoint.
pub trait Middleware: Send + Sync + 'static {
    /// The middleware's skippable identity; anonymous middleware return
    /// `None` and can never be skipped.
    fn id(&self) -> Option<LayerId> {
        None
    }

    /// Runs the layer. Call `next.run(state).await` to continue inward; skip
    /// the call to short-circuit (typically after raising or setting a reply).
    fn handle<'a>(&'a self, state: &'a RequestState, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// Adapts a closure into a [`Middleware`].
pub struct MiddlewareFn<F> {
    id: Option<LayerId>,
    func: F,
}

impl<F> MiddlewareFn<F>
where
    F: for<'a> Fn(&'a RequestState, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    /// Wraps an anonymous middleware closure.
    pub fn new(func: F) -> Self {
        Self { id: None, func }
    }

    /// Wraps a middleware closure with a skippable identity.
    pub fn with_id(id: LayerId, func: F) -> Self {
        Self { id: Some(id), func }
    }
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a RequestState, Next<'a>) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn id(&self) -> Option<LayerId> {
        self.id
    }

    fn handle<'a>(&'a self, state: &'a RequestState, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (self.func)(state, next)
    }
}
