//! Scope configuration options.
//!
//! Applications, controllers, and routes are all configured the same way: a
//! list of [`Configure`] values produced by the free functions in this
//! module. Each option is a deferred mutation of the target's [`Scope`].

use std::sync::Arc;

use trellis_core::StorageKey;

use crate::guard::{Guard, GuardFn};
use crate::handler::{HandlerStep, PreExecute};
use crate::interceptor::{Interceptor, InterceptorFn};
use crate::middleware::{Middleware, MiddlewareFn};
use crate::outcome::{BoxFuture, Finalizer, Outcome, ValueTransform};
use crate::route::normalize_fragment;
use crate::scope::Scope;
use crate::skip::LayerId;
use crate::state::RequestState;

/// One deferred scope mutation.
pub struct Configure(Box<dyn FnOnce(&mut Scope) + Send>);

impl Configure {
    fn new(f: impl FnOnce(&mut Scope) + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn apply(self, scope: &mut Scope) {
        (self.0)(scope);
    }
}

impl std::fmt::Debug for Configure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Configure(..)")
    }
}

/// Sets the scope's path prefix. The fragment is normalized: a single
/// leading slash, no trailing slash, and `/` alone collapses to nothing.
#[must_use]
pub fn prefix(path: impl Into<String>) -> Configure {
    let path = path.into();
    Configure::new(move |scope| scope.set_prefix(normalize_fragment(&path)))
}

/// Adds a pre-execute hook. Hooks run before the chain, cannot raise, and
/// cannot be skipped.
#[must_use]
pub fn pre_execute<F>(hook: F) -> Configure
where
    F: for<'a> Fn(&'a RequestState) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    let hook: PreExecute = Arc::new(hook);
    Configure::new(move |scope| scope.add_pre_execute(hook))
}

/// Adds a middleware.
#[must_use]
pub fn middleware(middleware: impl Middleware) -> Configure {
    shared_middleware(Arc::new(middleware))
}

/// Adds an already shared middleware, e.g. one installed on several scopes.
#[must_use]
pub fn shared_middleware(middleware: Arc<dyn Middleware>) -> Configure {
    Configure::new(move |scope| scope.add_middleware(middleware))
}

/// Adds an anonymous middleware from a closure.
#[must_use]
pub fn middleware_fn<F>(func: F) -> Configure
where
    F: for<'a> Fn(&'a RequestState, crate::chain::Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    middleware(MiddlewareFn::new(func))
}

/// Adds a guard.
#[must_use]
pub fn guard(guard: impl Guard) -> Configure {
    shared_guard(Arc::new(guard))
}

/// Adds an already shared guard.
#[must_use]
pub fn shared_guard(guard: Arc<dyn Guard>) -> Configure {
    Configure::new(move |scope| scope.add_guard(guard))
}

/// Adds an anonymous guard from a closure.
#[must_use]
pub fn guard_fn<F>(func: F) -> Configure
where
    F: for<'a> Fn(&'a RequestState) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    guard(GuardFn::new(func))
}

/// Adds an interceptor.
#[must_use]
pub fn interceptor(interceptor: impl Interceptor) -> Configure {
    shared_interceptor(Arc::new(interceptor))
}

/// Adds an already shared interceptor.
#[must_use]
pub fn shared_interceptor(interceptor: Arc<dyn Interceptor>) -> Configure {
    Configure::new(move |scope| scope.add_interceptor(interceptor))
}

/// Adds an anonymous interceptor from a closure.
#[must_use]
pub fn interceptor_fn<F>(func: F) -> Configure
where
    F: for<'a> Fn(&'a RequestState, crate::chain::Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    interceptor(InterceptorFn::new(func))
}

/// Adds a handler step. Scope-level steps run before narrower scopes' steps.
#[must_use]
pub fn handle<F>(func: F) -> Configure
where
    F: for<'a> Fn(&'a RequestState) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    handle_step(Arc::new(func))
}

/// Adds an already shared handler step.
#[must_use]
pub fn handle_step(step: HandlerStep) -> Configure {
    Configure::new(move |scope| scope.add_step(step))
}

/// Attaches one metadata entry to the scope.
#[must_use]
pub fn metadata<K, V>(key: K, value: V) -> Configure
where
    K: StorageKey + Send + 'static,
    V: Send + Sync + 'static,
{
    Configure::new(move |scope| scope.insert_metadata_raw(&key, Arc::new(value)))
}

/// Declares inherited layers this scope opts out of.
///
/// Identities union within one scope; across scopes the narrower scope's
/// declaration shadows wider ones entirely.
#[must_use]
pub fn skip(ids: impl IntoIterator<Item = LayerId>) -> Configure {
    let ids: Vec<LayerId> = ids.into_iter().collect();
    Configure::new(move |scope| scope.add_skips(ids))
}

/// Declares that this scope skips every guard, whatever its identity.
#[must_use]
pub fn skip_all_guards() -> Configure {
    skip([LayerId::ALL_GUARDS])
}

/// Sets the response finalizer. Endpoints resolve the nearest finalizer
/// leaf-to-root; every endpoint must resolve one or the build fails.
#[must_use]
pub fn finalizer<F>(func: F) -> Configure
where
    F: for<'a> Fn(&'a RequestState, trellis_core::Reply) -> BoxFuture<'a, Result<(), anyhow::Error>>
        + Send
        + Sync
        + 'static,
{
    let finalizer: Finalizer = Arc::new(func);
    Configure::new(move |scope| scope.set_finalizer(finalizer))
}

/// Sets the value transform that resolves captured raises, replacing the
/// default. Resolved leaf-to-root like the finalizer.
#[must_use]
pub fn value_transform<F>(func: F) -> Configure
where
    F: Fn(&RequestState, crate::outcome::Raise) -> trellis_core::Reply + Send + Sync + 'static,
{
    let transform: ValueTransform = Arc::new(func);
    Configure::new(move |scope| scope.set_transform(transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skip::{skip_key, SkipSet};
    use trellis_core::NamedKey;

    #[test]
    fn test_prefix_is_normalized() {
        for (raw, expect) in [
            ("/api/", "/api"),
            ("api", "/api"),
            ("/", ""),
            ("", ""),
            ("/api/v2", "/api/v2"),
        ] {
            let mut scope = Scope::new();
            prefix(raw).apply(&mut scope);
            assert_eq!(scope.prefix(), expect, "fragment {raw:?}");
        }
    }

    #[test]
    fn test_metadata_option_attaches_entry() {
        let mut scope = Scope::new();
        metadata(NamedKey::new("owner"), "platform".to_string()).apply(&mut scope);

        assert_eq!(
            scope
                .metadata()
                .get::<String>(&NamedKey::new("owner"))
                .as_deref(),
            Some(&"platform".to_string())
        );
    }

    #[test]
    fn test_skip_options_accumulate() {
        let mut scope = Scope::new();
        skip([LayerId::new("audit")]).apply(&mut scope);
        skip_all_guards().apply(&mut scope);

        let set = scope.metadata().get::<SkipSet>(&skip_key()).unwrap();
        assert!(set.contains(&LayerId::new("audit")));
        assert!(set.contains(&LayerId::ALL_GUARDS));
    }
}
