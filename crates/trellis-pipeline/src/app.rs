//! Application assembly.
//!
//! An [`App`] is the root (or a nested branch) of the scope tree. It gathers
//! controllers, free routes, and sub-applications, and `build` flattens the
//! whole tree into one list of compiled endpoints. Building flips every
//! scope's built flag; registration and rebuilds fail afterwards.

use std::sync::Arc;

use http::Method;
use tracing::debug;
use trellis_core::BuildError;

use crate::controller::Controller;
use crate::endpoint::Endpoint;
use crate::options::Configure;
use crate::route::Route;
use crate::scope::Scope;

/// The root of a scope tree, or a nested branch of a larger one.
pub struct App {
    scope: Scope,
    controllers: Vec<Controller>,
    routes: Vec<Route>,
    sub_apps: Vec<App>,
    endpoints: Vec<Arc<Endpoint>>,
}

impl App {
    /// Creates an application.
    #[must_use]
    pub fn new(options: impl IntoIterator<Item = Configure>) -> Self {
        let mut scope = Scope::new();
        for option in options {
            option.apply(&mut scope);
        }
        Self {
            scope,
            controllers: Vec::new(),
            routes: Vec::new(),
            sub_apps: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    /// Registers a controller.
    ///
    /// # Errors
    ///
    /// Fails once the application is built.
    pub fn add_controller(&mut self, controller: Controller) -> Result<&mut Self, BuildError> {
        self.ensure_mutable()?;
        self.controllers.push(controller);
        Ok(self)
    }

    /// Registers a route directly on the application, outside any controller.
    ///
    /// # Errors
    ///
    /// Fails once the application is built.
    pub fn add_route(&mut self, route: Route) -> Result<&mut Self, BuildError> {
        self.ensure_mutable()?;
        self.routes.push(route);
        Ok(self)
    }

    /// Nests another application under this one. The child's endpoints are
    /// flattened into this application at build.
    ///
    /// # Errors
    ///
    /// Fails once the application is built.
    pub fn add_sub_app(&mut self, app: Self) -> Result<&mut Self, BuildError> {
        self.ensure_mutable()?;
        self.sub_apps.push(app);
        Ok(self)
    }

    /// Compiles the whole tree into endpoints and freezes every scope.
    ///
    /// # Errors
    ///
    /// Fails when any scope was already built or an endpoint resolves no
    /// finalizer. A failed build leaves the tree frozen, not half-mutable.
    pub fn build(&mut self) -> Result<(), BuildError> {
        let routes = self.collect_routes()?;
        self.endpoints.reserve(routes.len());
        for route in routes {
            let endpoint = route.compile()?;
            debug!(
                name = endpoint.name(),
                method = %endpoint.method(),
                path = endpoint.path(),
                "compiled endpoint"
            );
            self.endpoints.push(Arc::new(endpoint));
        }
        Ok(())
    }

    /// Returns the compiled endpoints; empty before `build`.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Looks an endpoint up by method and full path.
    #[must_use]
    pub fn endpoint(&self, method: &Method, path: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.method() == method && endpoint.path() == path)
    }

    /// Looks an endpoint up by display name.
    #[must_use]
    pub fn endpoint_named(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints.iter().find(|endpoint| endpoint.name() == name)
    }

    fn ensure_mutable(&self) -> Result<(), BuildError> {
        if self.scope.is_built() {
            return Err(BuildError::AlreadyBuilt {
                what: "application".to_string(),
            });
        }
        Ok(())
    }

    /// Drains the tree into fully absorbed routes, marking scopes built on
    /// the way down.
    fn collect_routes(&mut self) -> Result<Vec<Route>, BuildError> {
        self.scope.mark_built("application")?;

        let mut routes = Vec::new();
        for controller in std::mem::take(&mut self.controllers) {
            routes.extend(controller.into_routes()?);
        }
        routes.append(&mut self.routes);
        for mut sub_app in std::mem::take(&mut self.sub_apps) {
            routes.extend(sub_app.collect_routes()?);
        }

        for route in &mut routes {
            route.absorb_parent(&self.scope);
        }
        Ok(routes)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("built", &self.scope.is_built())
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}
