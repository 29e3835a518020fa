//! Handler steps and pre-execute hooks.
//!
//! Handler steps are the terminal stage of the chain: plain async functions
//! over the request state, run in order, each able to raise. Pre-execute
//! hooks run before the chain itself, outside the capture machinery — they
//! cannot raise and cannot be skipped, which makes them the place for
//! transport setup that every request must get.

use std::sync::Arc;

use crate::outcome::{BoxFuture, Outcome};
use crate::state::RequestState;

/// One terminal handler step.
pub type HandlerStep = Arc<dyn for<'a> Fn(&'a RequestState) -> BoxFuture<'a, Outcome> + Send + Sync>;

/// A hook run by the driver before the chain starts. Infallible and never
/// skippable.
pub type PreExecute = Arc<dyn for<'a> Fn(&'a RequestState) -> BoxFuture<'a, ()> + Send + Sync>;

/// Composes several steps into one that runs them in order, stopping at the
/// first raise.
#[must_use]
pub fn steps(steps: Vec<HandlerStep>) -> HandlerStep {
    Arc::new(move |state| {
        let steps = steps.clone();
        Box::pin(async move {
            for step in &steps {
                step(state).await?;
            }
            Ok(())
        })
    })
}

/// Wraps a factory so each request gets a freshly constructed step.
///
/// The factory runs once per dispatch, giving the step per-request captured
/// state without sharing anything across requests.
#[must_use]
pub fn scoped<F>(factory: F) -> HandlerStep
where
    F: Fn() -> HandlerStep + Send + Sync + 'static,
{
    Arc::new(move |state| {
        let step = factory();
        Box::pin(async move { step(state).await })
    })
}
