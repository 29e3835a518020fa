//! Stage outcomes and the raise channel.
//!
//! A pipeline stage finishes in one of two ways: it returns `Ok(())` and the
//! chain continues inward, or it raises. A [`Raise`] is a tagged early exit,
//! not a transport error: it travels outward through `?` until the nearest
//! capture boundary resolves it into the request's reply and execution resumes
//! with the after-logic of every enclosing layer.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;
use trellis_core::{RawReply, Reply, Response};

use crate::state::RequestState;

/// An owned, boxed, `Send` future — the return currency of every async seam
/// in the pipeline.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of one pipeline stage.
///
/// `Ok(())` means "continue inward"; `Err` carries the raise outward to the
/// nearest capture boundary.
pub type Outcome = Result<(), Raise>;

/// A tagged early exit from a pipeline stage.
pub enum Raise {
    /// The stage raised a complete reply; it becomes the request's response
    /// as-is.
    Reply(Reply),
    /// The stage raised an error; it is unwrapped into a reply by the
    /// endpoint's value transform.
    Error(anyhow::Error),
    /// The stage raised an arbitrary value; it resolves to an
    /// unknown-fault reply retaining the value for diagnostics.
    Value(Box<dyn Any + Send + Sync>),
}

impl Raise {
    /// Raises an arbitrary value.
    #[must_use]
    pub fn value(value: impl Any + Send + Sync) -> Self {
        Self::Value(Box::new(value))
    }
}

impl From<Reply> for Raise {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

impl From<Response> for Raise {
    fn from(response: Response) -> Self {
        Self::Reply(Reply::Structured(response))
    }
}

impl From<RawReply> for Raise {
    fn from(raw: RawReply) -> Self {
        Self::Reply(Reply::Raw(raw))
    }
}

impl From<anyhow::Error> for Raise {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(err)
    }
}

impl fmt::Debug for Raise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reply(reply) => f.debug_tuple("Reply").field(reply).finish(),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::Value(_) => f.write_str("Value(<opaque>)"),
        }
    }
}

/// Resolves a captured [`Raise`] into the reply that will occupy the
/// request's response slot.
///
/// Every endpoint carries exactly one transform, inherited leaf-to-root like
/// the finalizer. See [`default_value_transform`] for the stock behavior.
pub type ValueTransform = Arc<dyn Fn(&RequestState, Raise) -> Reply + Send + Sync>;

/// Delivers the resolved reply to the outside world.
///
/// The finalizer is the externally supplied last step of every dispatch: a
/// transport adapter serializes and writes the reply here. Its error is the
/// only structural failure a dispatch can report.
pub type Finalizer =
    Arc<dyn for<'a> Fn(&'a RequestState, Reply) -> BoxFuture<'a, Result<(), anyhow::Error>> + Send + Sync>;

/// The stock value transform.
///
/// Raised replies pass through unchanged, raised errors are unwrapped (a
/// reply buried in the error chain wins, anything else becomes an
/// unknown-fault response carrying the message), and raised non-reply values
/// become unknown-fault replies that retain the value and log a warning.
#[must_use]
pub fn default_value_transform() -> ValueTransform {
    Arc::new(|state: &RequestState, raise: Raise| match raise {
        Raise::Reply(reply) => reply,
        Raise::Error(err) => Reply::wrap_error(err),
        Raise::Value(value) => {
            warn!(
                request_id = %state.id(),
                "stage raised a non-reply value; resolving to an unknown fault"
            );
            Reply::unrecognized(value)
        }
    })
}
