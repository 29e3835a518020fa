//! Guards: boolean-style admission checks.
//!
//! Guards run after every middleware's before-logic and before any
//! interceptor. They do not wrap the rest of the chain; each guard either
//! returns `Ok(())` to admit the request or raises a denial. A denial is
//! captured at the guard stage boundary, so neither the remaining guards nor
//! anything inward of them runs — but every middleware's after-logic still
//! does.

use crate::outcome::{BoxFuture, Outcome};
use crate::skip::LayerId;
use crate::state::RequestState;

/// An admission check evaluated before the endpoint's inner stages.
pub trait Guard: Send + Sync + 'static {
    /// The guard's skippable identity; anonymous guards return `None` and
    /// can never be skipped individually.
    fn id(&self) -> Option<LayerId> {
        None
    }

    /// Admits (`Ok`) or denies (raise) the request.
    fn allow<'a>(&'a self, state: &'a RequestState) -> BoxFuture<'a, Outcome>;
}

/// Adapts a closure into a [`Guard`].
pub struct GuardFn<F> {
    id: Option<LayerId>,
    func: F,
}

impl<F> GuardFn<F>
where
    F: for<'a> Fn(&'a RequestState) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    /// Wraps an anonymous guard closure.
    pub fn new(func: F) -> Self {
        Self { id: None, func }
    }

    /// Wraps a guard closure with a skippable identity.
    pub fn with_id(id: LayerId, func: F) -> Self {
        Self { id: Some(id), func }
    }
}

impl<F> Guard for GuardFn<F>
where
    F: for<'a> Fn(&'a RequestState) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn id(&self) -> Option<LayerId> {
        self.id
    }

    fn allow<'a>(&'a self, state: &'a RequestState) -> BoxFuture<'a, Outcome> {
        (self.func)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Code, Response};

    #[tokio::test]
    async fn test_guard_fn_admits_and_denies() {
        let admit = GuardFn::new(|_state| Box::pin(async { Ok(()) }));
        assert!(admit.allow(&RequestState::new()).await.is_ok());
        assert!(admit.id().is_none());

        let deny = GuardFn::with_id(LayerId::new("deny-all"), |_state| {
            Box::pin(async { Err(Response::failure(Code::PermissionDenied).into()) })
        });
        assert_eq!(deny.id(), Some(LayerId::new("deny-all")));
        assert!(deny.allow(&RequestState::new()).await.is_err());
    }
}
