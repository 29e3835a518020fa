//! The unit of pipeline configuration.
//!
//! Applications, controllers, and routes all carry a [`Scope`]: a path
//! prefix, the four layer lists, handler steps, metadata, and the optional
//! finalizer and value transform. Scopes nest; at build time each child
//! absorbs its parent so that inherited lists run parent-first and inherited
//! singletons resolve leaf-to-root.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use trellis_core::BuildError;

use crate::guard::Guard;
use crate::handler::{HandlerStep, PreExecute};
use crate::interceptor::Interceptor;
use crate::metadata::Metadata;
use crate::middleware::Middleware;
use crate::outcome::{Finalizer, ValueTransform};
use crate::skip::{skip_key, LayerId, SkipSet};

/// One level of pipeline configuration.
pub struct Scope {
    prefix: String,
    pre_executes: Vec<PreExecute>,
    middlewares: Vec<Arc<dyn Middleware>>,
    guards: Vec<Arc<dyn Guard>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    steps: Vec<HandlerStep>,
    metadata: Metadata,
    finalizer: Option<Finalizer>,
    transform: Option<ValueTransform>,
    built: AtomicBool,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Self {
            prefix: String::new(),
            pre_executes: Vec::new(),
            middlewares: Vec::new(),
            guards: Vec::new(),
            interceptors: Vec::new(),
            steps: Vec::new(),
            metadata: Metadata::new(),
            finalizer: None,
            transform: None,
            built: AtomicBool::new(false),
        }
    }

    /// Returns the scope's own path prefix (parents included only after the
    /// scope absorbed them).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the scope's own metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Reports whether the scope's built flag has flipped.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::SeqCst)
    }

    /// Flips the built flag, failing if it was already set.
    pub(crate) fn mark_built(&self, what: &str) -> Result<(), BuildError> {
        if self.built.swap(true, Ordering::SeqCst) {
            return Err(BuildError::AlreadyBuilt {
                what: what.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn set_prefix(&mut self, prefix: String) {
        self.prefix = prefix;
    }

    pub(crate) fn add_pre_execute(&mut self, hook: PreExecute) {
        self.pre_executes.push(hook);
    }

    pub(crate) fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub(crate) fn add_guard(&mut self, guard: Arc<dyn Guard>) {
        self.guards.push(guard);
    }

    pub(crate) fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub(crate) fn add_step(&mut self, step: HandlerStep) {
        self.steps.push(step);
    }

    pub(crate) fn set_finalizer(&mut self, finalizer: Finalizer) {
        self.finalizer = Some(finalizer);
    }

    pub(crate) fn set_transform(&mut self, transform: ValueTransform) {
        self.transform = Some(transform);
    }

    pub(crate) fn insert_metadata_raw(
        &mut self,
        key: &dyn trellis_core::StorageKey,
        value: trellis_core::StoredValue,
    ) {
        self.metadata.insert_raw(key, value);
    }

    /// Unions `ids` into this scope's own skip set.
    ///
    /// The set lives in ordinary metadata, so across scopes the layered
    /// override rule applies: a narrower scope's set replaces a wider one's
    /// for lookups, it does not union with it.
    pub(crate) fn add_skips(&mut self, ids: impl IntoIterator<Item = LayerId>) {
        let mut set = self
            .metadata
            .get::<SkipSet>(&skip_key())
            .map(|resident| (*resident).clone())
            .unwrap_or_default();
        set.extend(ids);
        self.metadata.insert(&skip_key(), set);
    }

    /// Folds `parent` into this scope.
    ///
    /// Parent lists are prepended so they run first; the prefix is prepended;
    /// the finalizer and value transform are taken from the parent only when
    /// this scope has none of its own. Metadata is deliberately left alone —
    /// the endpoint compiler keeps parent maps as separate chain layers.
    pub(crate) fn absorb_parent(&mut self, parent: &Self) {
        self.prefix = format!("{}{}", parent.prefix, self.prefix);
        prepend(&mut self.pre_executes, &parent.pre_executes);
        prepend(&mut self.middlewares, &parent.middlewares);
        prepend(&mut self.guards, &parent.guards);
        prepend(&mut self.interceptors, &parent.interceptors);
        prepend(&mut self.steps, &parent.steps);
        if self.finalizer.is_none() {
            self.finalizer = parent.finalizer.clone();
        }
        if self.transform.is_none() {
            self.transform = parent.transform.clone();
        }
    }

    pub(crate) fn into_parts(self) -> ScopeParts {
        ScopeParts {
            prefix: self.prefix,
            pre_executes: self.pre_executes,
            middlewares: self.middlewares,
            guards: self.guards,
            interceptors: self.interceptors,
            steps: self.steps,
            metadata: self.metadata,
            finalizer: self.finalizer,
            transform: self.transform,
        }
    }
}

fn prepend<T: Clone>(own: &mut Vec<T>, parent: &[T]) {
    if parent.is_empty() {
        return;
    }
    let mut merged = parent.to_vec();
    merged.append(own);
    *own = merged;
}

/// The fields of a fully absorbed scope, handed to the endpoint compiler.
pub(crate) struct ScopeParts {
    pub(crate) prefix: String,
    pub(crate) pre_executes: Vec<PreExecute>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) guards: Vec<Arc<dyn Guard>>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) steps: Vec<HandlerStep>,
    pub(crate) metadata: Metadata,
    pub(crate) finalizer: Option<Finalizer>,
    pub(crate) transform: Option<ValueTransform>,
}
