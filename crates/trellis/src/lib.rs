//! # Trellis
//!
//! **A layered request-pipeline engine.**
//!
//! Trellis composes request handling out of nested scopes — application,
//! sub-applications, controllers, routes — each contributing middleware,
//! guards, interceptors, handler steps, and metadata. Building the
//! application compiles every route into a flat list of endpoints with a
//! frozen, skip-filtered execution chain.
//!
//! - **Four-stage chain** – middleware wrap everything, guards admit or
//!   deny, interceptors wrap admitted work, handler steps run last
//! - **Raise, don't return** – any stage exits early by raising a reply,
//!   an error, or an arbitrary value; the nearest capture boundary resolves
//!   it into the single response slot and after-logic still runs
//! - **Skip by identity** – a narrower scope opts out of inherited layers
//!   at build time
//! - **Layered metadata** – per-endpoint lookup where the most specific
//!   scope wins
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! let mut app = App::new([
//!     options::prefix("/api"),
//!     options::finalizer(|_state, reply| Box::pin(async move {
//!         deliver(reply).await
//!     })),
//! ]);
//! app.add_controller(
//!     Controller::new("users", [options::prefix("/users")])
//!         .route("list", || Route::get("/", [options::handle(|state| {
//!             Box::pin(async { Err(Response::ok("[]").into()) })
//!         })])),
//! )?;
//! app.build()?;
//!
//! let endpoint = app.endpoint_named("users.list").unwrap().clone();
//! endpoint.dispatch().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/trellis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the vocabulary crate
pub use trellis_core as core;

// Re-export the engine crate
pub use trellis_pipeline as pipeline;

// Scope options under their usual name
pub use trellis_pipeline::options;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use trellis_core::{
        BuildError, Code, DispatchError, NamedKey, RawReply, Reply, RequestStorage, Response,
        StorageError, StorageKey, TypeKey,
    };

    pub use trellis_pipeline::{
        options, App, BoxFuture, Controller, Endpoint, Guard, GuardFn, Interceptor, InterceptorFn,
        LayerId, Middleware, MiddlewareFn, Next, Outcome, Raise, RequestId, RequestState, Route,
    };
}
