//! # Trellis Core
//!
//! Foundational types for the Trellis request-pipeline engine:
//!
//! - [`RequestStorage`] - concurrency-safe, type-erased per-request store
//! - [`Reply`] / [`Response`] / [`RawReply`] - the polymorphic response model
//! - [`Code`] - the standard failure-kind taxonomy
//! - [`StorageError`], [`BuildError`], [`DispatchError`] - engine error types
//!
//! The pipeline itself (scopes, chains, the execution driver) lives in
//! `trellis-pipeline`; this crate carries only the vocabulary both the engine
//! and transport adapters speak.

#![doc(html_root_url = "https://docs.rs/trellis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod code;
mod error;
mod reply;
mod storage;

pub use code::Code;
pub use error::{BuildError, DispatchError, StorageError};
pub use reply::{RawReply, Reply, Response, RAISED_VALUE_KEY};
pub use storage::{NamedKey, RequestStorage, StorageKey, StoredValue, TypeKey};
