//! Engine error types.
//!
//! These cover the engine's own failure surface: storage access, build-time
//! configuration defects, and per-request finalization failures. Outcomes of
//! the pipeline itself travel as replies, not as these errors — see the
//! response model in [`reply`](crate::reply).

use thiserror::Error;

/// Errors from typed [`RequestStorage`](crate::RequestStorage) access.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No value is stored under the requested key.
    #[error("no value stored for key `{key}`")]
    NotFound {
        /// The rendered key.
        key: String,
    },

    /// A value is stored but is not of the requested type.
    #[error("value for key `{key}` is not a `{expected}`")]
    TypeMismatch {
        /// The rendered key.
        key: String,
        /// The type the caller asked for.
        expected: &'static str,
    },
}

/// Build-time configuration defects.
///
/// These are programming errors in how the application was assembled. They
/// surface once, at build, and are never converted into per-request replies.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A scope, application, or endpoint was built twice or mutated after
    /// its built flag flipped.
    #[error("{what} is already built and can no longer change")]
    AlreadyBuilt {
        /// Description of the offending unit.
        what: String,
    },

    /// An endpoint resolved no response finalizer through inheritance.
    #[error("endpoint `{endpoint}` resolved no response finalizer")]
    MissingFinalizer {
        /// Display name of the endpoint.
        endpoint: String,
    },
}

/// Per-request driver failures.
///
/// The only way a dispatched request fails structurally instead of producing
/// a reply: the externally supplied finalizer itself errored.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The response finalizer returned an error while delivering the reply.
    #[error("response finalizer failed for endpoint `{endpoint}`")]
    Finalize {
        /// Display name of the endpoint.
        endpoint: String,
        /// The finalizer's error.
        #[source]
        source: anyhow::Error,
    },
}
