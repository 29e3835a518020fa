//! The compiled execution chain.
//!
//! An endpoint's chain runs in four stages: middleware (wrapping), guards
//! (admission), interceptors (wrapping, admitted requests only), then the
//! handler steps. A [`Next`] value is the cursor into the chain that
//! wrapping layers receive.
//!
//! Every link is a capture boundary: a raise from the stage it invokes is
//! resolved into the response slot right there, and control returns normally
//! to the enclosing layer. That is what makes after-logic unconditional —
//! an outer middleware's code after `next.run(state).await` always executes,
//! whatever happened further in.

use std::future::Future;
use std::sync::Arc;

use tracing::trace;

use crate::driver::ExecutionState;
use crate::guard::Guard;
use crate::handler::HandlerStep;
use crate::interceptor::Interceptor;
use crate::middleware::Middleware;
use crate::outcome::{BoxFuture, Outcome, ValueTransform};
use crate::state::RequestState;

/// The four stages, with a cursor into the wrapping ones.
#[derive(Clone, Copy, Debug)]
enum Phase {
    Middleware(usize),
    Guards,
    Interceptor(usize),
    Handler,
}

/// A compiled endpoint's stage lists, skip-filtered and frozen at build.
pub(crate) struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
    guards: Vec<Arc<dyn Guard>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    steps: Vec<HandlerStep>,
    transform: ValueTransform,
}

impl Chain {
    pub(crate) fn new(
        middlewares: Vec<Arc<dyn Middleware>>,
        guards: Vec<Arc<dyn Guard>>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        steps: Vec<HandlerStep>,
        transform: ValueTransform,
    ) -> Self {
        Self {
            middlewares,
            guards,
            interceptors,
            steps,
            transform,
        }
    }

    /// Runs the chain to completion. Never fails: every raise is resolved
    /// into the response slot on the way out.
    pub(crate) async fn execute(&self, state: &RequestState) {
        Next {
            chain: self,
            phase: Phase::Middleware(0),
        }
        .run(state)
        .await;
    }

    /// Awaits one stage and resolves its raise, if any, into the slot.
    async fn capture<F>(&self, state: &RequestState, stage: F)
    where
        F: Future<Output = Outcome> + Send,
    {
        if let Err(raise) = stage.await {
            let reply = (self.transform)(state, raise);
            state.set_reply(reply);
        }
    }

    /// The guard stage plus everything inward of it. A denial propagates to
    /// the guard-stage capture boundary, so interceptors and handlers never
    /// run for a denied request.
    async fn admit_and_continue(&self, state: &RequestState) -> Outcome {
        if !self.guards.is_empty() {
            trace!(stage = %ExecutionState::GuardEvaluating, guards = self.guards.len());
        }
        for guard in &self.guards {
            guard.allow(state).await?;
        }
        Next {
            chain: self,
            phase: Phase::Interceptor(0),
        }
        .run(state)
        .await;
        Ok(())
    }

    async fn run_steps(&self, state: &RequestState) -> Outcome {
        trace!(stage = %ExecutionState::HandlerRunning, steps = self.steps.len());
        for step in &self.steps {
            step(state).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("middlewares", &self.middlewares.len())
            .field("guards", &self.guards.len())
            .field("interceptors", &self.interceptors.len())
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// The continuation handed to wrapping layers.
///
/// Calling [`run`](Self::run) executes everything inward of the current
/// layer and returns once the rest of the chain has settled; not calling it
/// short-circuits the chain at this layer.
pub struct Next<'a> {
    chain: &'a Chain,
    phase: Phase,
}

impl<'a> Next<'a> {
    /// Runs the remainder of the chain.
    ///
    /// Returns `()` rather than an outcome: anything inward that raised has
    /// already been resolved into the response slot by the time this future
    /// completes.
    pub fn run(self, state: &'a RequestState) -> BoxFuture<'a, ()> {
        let Self { chain, phase } = self;
        Box::pin(async move {
            match phase {
                Phase::Middleware(index) => match chain.middlewares.get(index) {
                    Some(middleware) => {
                        if index == 0 {
                            trace!(
                                stage = %ExecutionState::MiddlewareActive,
                                middlewares = chain.middlewares.len()
                            );
                        }
                        let next = Self {
                            chain,
                            phase: Phase::Middleware(index + 1),
                        };
                        chain.capture(state, middleware.handle(state, next)).await;
                    }
                    None => {
                        Self {
                            chain,
                            phase: Phase::Guards,
                        }
                        .run(state)
                        .await;
                    }
                },
                Phase::Guards => {
                    chain.capture(state, chain.admit_and_continue(state)).await;
                }
                Phase::Interceptor(index) => match chain.interceptors.get(index) {
                    Some(interceptor) => {
                        if index == 0 {
                            trace!(
                                stage = %ExecutionState::Intercepting,
                                interceptors = chain.interceptors.len()
                            );
                        }
                        let next = Self {
                            chain,
                            phase: Phase::Interceptor(index + 1),
                        };
                        chain.capture(state, interceptor.intercept(state, next)).await;
                    }
                    None => {
                        Self {
                            chain,
                            phase: Phase::Handler,
                        }
                        .run(state)
                        .await;
                    }
                },
                Phase::Handler => {
                    chain.capture(state, chain.run_steps(state)).await;
                }
            }
        })
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").field("phase", &self.phase).finish()
    }
}
