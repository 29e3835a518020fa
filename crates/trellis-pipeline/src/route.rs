//! Route declaration and endpoint compilation.
//!
//! A [`Route`] binds a method and path fragment to a scope of its own. At
//! build time it absorbs each enclosing scope, then compiles into an
//! [`Endpoint`]: the path is joined with every prefix, the metadata layers
//! are chained root-to-leaf, skip declarations are applied, and the
//! finalizer and value transform resolve leaf-to-root.

use std::sync::Arc;

use http::Method;
use trellis_core::BuildError;

use crate::chain::Chain;
use crate::endpoint::Endpoint;
use crate::metadata::{Metadata, MetadataChain};
use crate::options::Configure;
use crate::outcome::default_value_transform;
use crate::scope::Scope;
use crate::skip::{skip_key, LayerId, SkipSet};

/// Normalizes one path fragment: a single leading slash, no trailing slash.
/// A bare `/` (or an empty fragment) collapses to nothing so that joining
/// never doubles separators.
pub(crate) fn normalize_fragment(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// One declared route, not yet compiled.
pub struct Route {
    method: Method,
    path: String,
    name: Option<String>,
    scope: Scope,
    // Metadata of absorbed parents, root-first.
    ancestor_meta: Vec<Arc<Metadata>>,
}

impl Route {
    /// Declares a route.
    #[must_use]
    pub fn new(
        method: Method,
        path: impl Into<String>,
        options: impl IntoIterator<Item = Configure>,
    ) -> Self {
        let mut scope = Scope::new();
        for option in options {
            option.apply(&mut scope);
        }
        Self {
            method,
            path: normalize_fragment(&path.into()),
            name: None,
            scope,
            ancestor_meta: Vec::new(),
        }
    }

    /// Declares a `GET` route.
    #[must_use]
    pub fn get(path: impl Into<String>, options: impl IntoIterator<Item = Configure>) -> Self {
        Self::new(Method::GET, path, options)
    }

    /// Declares a `POST` route.
    #[must_use]
    pub fn post(path: impl Into<String>, options: impl IntoIterator<Item = Configure>) -> Self {
        Self::new(Method::POST, path, options)
    }

    /// Declares a `PUT` route.
    #[must_use]
    pub fn put(path: impl Into<String>, options: impl IntoIterator<Item = Configure>) -> Self {
        Self::new(Method::PUT, path, options)
    }

    /// Declares a `DELETE` route.
    #[must_use]
    pub fn delete(path: impl Into<String>, options: impl IntoIterator<Item = Configure>) -> Self {
        Self::new(Method::DELETE, path, options)
    }

    /// Sets the route's display name, replacing any previous one.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the route's method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the route's own (normalized) path fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Folds an enclosing scope into this route. Called leaf-to-root, so the
    /// parent's metadata lands in front of previously absorbed layers.
    pub(crate) fn absorb_parent(&mut self, parent: &Scope) {
        self.scope.absorb_parent(parent);
        self.ancestor_meta.insert(0, Arc::new(parent.metadata().clone()));
    }

    /// Compiles the fully absorbed route into an endpoint.
    pub(crate) fn compile(self) -> Result<Endpoint, BuildError> {
        let Self {
            method,
            path,
            name,
            scope,
            mut ancestor_meta,
        } = self;
        let parts = scope.into_parts();

        let full_path = {
            let joined = format!("{}{path}", parts.prefix);
            if joined.is_empty() {
                "/".to_string()
            } else {
                joined
            }
        };
        let display_name = name.unwrap_or_else(|| format!("{method} {full_path}"));

        ancestor_meta.push(Arc::new(parts.metadata));
        let metadata = MetadataChain::new(ancestor_meta);

        let skips: SkipSet = metadata
            .get::<SkipSet>(&skip_key())
            .map(|resident| (*resident).clone())
            .unwrap_or_default();

        let middlewares = retain_active(parts.middlewares, &skips, |m| m.id());
        let guards = if skips.contains(&LayerId::ALL_GUARDS) {
            Vec::new()
        } else {
            retain_active(parts.guards, &skips, |g| g.id())
        };
        let interceptors = retain_active(parts.interceptors, &skips, |i| i.id());

        let finalizer = parts.finalizer.ok_or_else(|| BuildError::MissingFinalizer {
            endpoint: display_name.clone(),
        })?;
        let transform = parts.transform.unwrap_or_else(default_value_transform);

        Ok(Endpoint::new(
            method,
            full_path,
            display_name,
            parts.pre_executes,
            Chain::new(middlewares, guards, interceptors, parts.steps, transform),
            finalizer,
            metadata,
        ))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}

/// Drops layers whose identity appears in the skip set. Anonymous layers
/// always survive.
fn retain_active<T: ?Sized>(
    layers: Vec<Arc<T>>,
    skips: &SkipSet,
    id_of: impl Fn(&T) -> Option<LayerId>,
) -> Vec<Arc<T>> {
    if skips.is_empty() {
        return layers;
    }
    layers
        .into_iter()
        .filter(|layer| id_of(layer).map_or(true, |id| !skips.contains(&id)))
        .collect()
}
