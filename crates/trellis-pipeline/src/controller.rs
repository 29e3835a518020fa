//! Controllers: named groups of routes under a shared scope.
//!
//! A controller registers its routes as an explicit list of named factories.
//! Each factory runs once, at build, and the produced route absorbs the
//! controller's scope and is named `<controller>.<route>`.

use trellis_core::BuildError;

use crate::options::Configure;
use crate::route::Route;
use crate::scope::Scope;

type RouteFactory = Box<dyn FnOnce() -> Route + Send>;

/// A named group of routes sharing one scope.
pub struct Controller {
    name: String,
    scope: Scope,
    routes: Vec<(String, RouteFactory)>,
}

impl Controller {
    /// Creates a controller.
    #[must_use]
    pub fn new(name: impl Into<String>, options: impl IntoIterator<Item = Configure>) -> Self {
        let mut scope = Scope::new();
        for option in options {
            option.apply(&mut scope);
        }
        Self {
            name: name.into(),
            scope,
            routes: Vec::new(),
        }
    }

    /// Registers one route under `name`. The factory is deferred until the
    /// application builds.
    #[must_use]
    pub fn route(
        mut self,
        name: impl Into<String>,
        factory: impl FnOnce() -> Route + Send + 'static,
    ) -> Self {
        self.routes.push((name.into(), Box::new(factory)));
        self
    }

    /// Returns the controller's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs every factory and absorbs the controller scope into each route.
    pub(crate) fn into_routes(self) -> Result<Vec<Route>, BuildError> {
        self.scope.mark_built(&format!("controller `{}`", self.name))?;

        let mut routes = Vec::with_capacity(self.routes.len());
        for (route_name, factory) in self.routes {
            let mut route = factory().with_name(format!("{}.{route_name}", self.name));
            route.absorb_parent(&self.scope);
            routes.push(route);
        }
        Ok(routes)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("routes", &self.routes.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}
