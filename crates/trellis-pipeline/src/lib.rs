//! # Trellis Pipeline
//!
//! The composition and execution engine: scopes layered over applications,
//! controllers, and routes; a four-stage cross-cutting chain (middleware,
//! guards, interceptors, handler steps) compiled per endpoint; and a driver
//! that runs requests through it.
//!
//! ## Building an application
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis_core::{Reply, Response};
//! use trellis_pipeline::{options, App, Route};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let delivered: Arc<Mutex<Option<Reply>>> = Arc::new(Mutex::new(None));
//! let sink = Arc::clone(&delivered);
//!
//! let mut app = App::new([
//!     options::prefix("/api"),
//!     options::finalizer(move |_state, reply| {
//!         let sink = Arc::clone(&sink);
//!         Box::pin(async move {
//!             *sink.lock() = Some(reply);
//!             Ok(())
//!         })
//!     }),
//! ]);
//! app.add_route(Route::get("/ping", [options::handle(|_state| {
//!     Box::pin(async { Err(Response::ok("pong").into()) })
//! })]))
//! .unwrap();
//! app.build().unwrap();
//!
//! let endpoint = app.endpoints()[0].clone();
//! endpoint.dispatch().await.unwrap();
//! assert_eq!(delivered.lock().as_ref().unwrap().status().as_u16(), 200);
//! # }
//! ```
//!
//! A handler produces its response by raising it: the nearest capture
//! boundary resolves the raise into the request's single response slot, and
//! every enclosing layer's after-logic still runs before the finalizer
//! delivers the reply.

#![doc(html_root_url = "https://docs.rs/trellis-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod chain;
mod controller;
mod driver;
mod endpoint;
mod guard;
mod handler;
mod interceptor;
mod metadata;
mod middleware;
pub mod options;
mod outcome;
mod route;
mod scope;
mod skip;
mod state;

pub use app::App;
pub use chain::Next;
pub use controller::Controller;
pub use driver::ExecutionState;
pub use endpoint::Endpoint;
pub use guard::{Guard, GuardFn};
pub use handler::{scoped, steps, HandlerStep, PreExecute};
pub use interceptor::{Interceptor, InterceptorFn};
pub use metadata::{Metadata, MetadataChain};
pub use middleware::{Middleware, MiddlewareFn};
pub use outcome::{default_value_transform, BoxFuture, Finalizer, Outcome, Raise, ValueTransform};
pub use route::Route;
pub use scope::Scope;
pub use skip::LayerId;
pub use state::{RequestId, RequestState};
