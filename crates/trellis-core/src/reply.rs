//! The polymorphic response model.
//!
//! Every request resolves to exactly one [`Reply`]:
//!
//! - [`Reply::Structured`] — a [`Response`] with a status, a symbolic
//!   [`Code`], an optional message, public metadata, and a JSON payload;
//! - [`Reply::Raw`] — a status plus opaque bytes, bypassing serialization;
//! - [`Reply::Unrecognized`] — produced when a layer raises a value that is
//!   not a reply; always reports [`Code::Unknown`] and retains the original
//!   value in internal metadata for diagnostics.
//!
//! A [`Response`] carries two metadata surfaces: `meta` is public and
//! serialized to the client, `internal` is a type-erased side channel for
//! passing diagnostic data between layers and is never serialized.

use crate::code::Code;
use crate::storage::StoredValue;
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Internal-metadata key under which an unrecognized raised value is kept.
pub const RAISED_VALUE_KEY: &str = "trellis.raised_value";

/// A structured response.
///
/// Only `code`, `message`, `meta`, and `data` serialize; the wire status and
/// the internal metadata never leave the process through serialization.
///
/// # Example
///
/// ```
/// use trellis_core::{Code, Response};
///
/// let denied = Response::failure(Code::PermissionDenied)
///     .with(|r| r.add_meta("required_role", "admin"));
/// assert_eq!(denied.status().as_u16(), 403);
/// assert_eq!(denied.code(), Code::PermissionDenied);
/// ```
#[derive(Clone, Serialize)]
pub struct Response {
    #[serde(skip)]
    status: StatusCode,
    code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip)]
    internal: HashMap<String, StoredValue>,
}

impl Response {
    /// Creates a 200 success response carrying `data`.
    #[must_use]
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            status: StatusCode::OK,
            code: Code::Ok,
            message: None,
            meta: None,
            data: Some(data.into()),
            internal: HashMap::new(),
        }
    }

    /// Creates an empty 200 success response.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            code: Code::Ok,
            message: None,
            meta: None,
            data: None,
            internal: HashMap::new(),
        }
    }

    /// Creates a failure response with the code's default status and message.
    #[must_use]
    pub fn failure(code: Code) -> Self {
        Self::failure_with(code, code.default_status(), code.default_message())
    }

    /// Creates a failure response with an explicit status and message.
    #[must_use]
    pub fn failure_with(code: Code, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: Some(message.into()),
            meta: None,
            data: None,
            internal: HashMap::new(),
        }
    }

    /// Returns the wire status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the symbolic code.
    #[must_use]
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the public metadata map, if any was attached.
    #[must_use]
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.meta.as_ref()
    }

    /// Returns the payload, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Copy-and-modify: clones this response and applies `f` to the clone.
    #[must_use]
    pub fn with(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    /// In-place modify: applies `f` to this response and returns it for
    /// chaining, letting layers progressively attach metadata as the reply
    /// threads outward.
    pub fn update(&mut self, f: impl FnOnce(&mut Self)) -> &mut Self {
        f(self);
        self
    }

    /// Sets the wire status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Sets the symbolic code.
    pub fn set_code(&mut self, code: Code) {
        self.code = code;
    }

    /// Sets the message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Sets the payload.
    pub fn set_data(&mut self, data: impl Into<Value>) {
        self.data = Some(data.into());
    }

    /// Attaches one public metadata entry, creating the map on first use.
    pub fn add_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
    }

    /// Attaches one internal metadata entry. Internal metadata is never
    /// serialized; it exists to pass diagnostic data between layers.
    pub fn set_internal<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.internal.insert(key.into(), Arc::new(value));
    }

    /// Attaches an already type-erased internal metadata entry.
    pub fn set_internal_raw(&mut self, key: impl Into<String>, value: StoredValue) {
        self.internal.insert(key.into(), value);
    }

    /// Returns the internal metadata entry under `key`, downcast to `T`.
    #[must_use]
    pub fn internal<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.internal_raw(key).and_then(|raw| raw.downcast::<T>().ok())
    }

    /// Returns the type-erased internal metadata entry under `key`.
    #[must_use]
    pub fn internal_raw(&self, key: &str) -> Option<StoredValue> {
        self.internal.get(key).map(Arc::clone)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("meta", &self.meta)
            .field("data", &self.data)
            .field("internal", &self.internal.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.code),
            None => f.write_str(self.code.as_str()),
        }
    }
}

impl std::error::Error for Response {}

/// A raw-bytes response that bypasses any serialization step.
#[derive(Debug, Clone)]
pub struct RawReply {
    status: StatusCode,
    body: Bytes,
}

impl RawReply {
    /// Creates a raw reply.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns the wire status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// The polymorphic request outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A structured response, serialized by the finalizer.
    Structured(Response),
    /// A raw-bytes response, written as-is.
    Raw(RawReply),
    /// A raised value that was not a reply; carries a [`Code::Unknown`]
    /// response retaining the value under [`RAISED_VALUE_KEY`].
    Unrecognized(Response),
}

impl Reply {
    /// Wraps a raised value that is not a reply.
    ///
    /// The resulting response always reports [`Code::Unknown`]; the original
    /// value is retained under [`RAISED_VALUE_KEY`] in internal metadata.
    #[must_use]
    pub fn unrecognized(value: Box<dyn Any + Send + Sync>) -> Self {
        let mut response = Response::failure(Code::Unknown);
        response.set_internal_raw(RAISED_VALUE_KEY, Arc::from(value));
        Self::Unrecognized(response)
    }

    /// Converts an arbitrary error into a reply.
    ///
    /// An error that is itself a [`Reply`] or [`Response`] is unwrapped;
    /// anything else becomes an unknown-fault structured response carrying
    /// the error message.
    #[must_use]
    pub fn wrap_error(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(reply) => reply,
            Err(err) => match err.downcast::<Response>() {
                Ok(response) => Self::Structured(response),
                Err(err) => Self::Structured(
                    Response::failure(Code::Unknown).with(|r| r.set_message(err.to_string())),
                ),
            },
        }
    }

    /// Returns the wire status of any variant.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Structured(response) | Self::Unrecognized(response) => response.status(),
            Self::Raw(raw) => raw.status(),
        }
    }

    /// Returns the symbolic code; raw replies have none.
    #[must_use]
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Structured(response) | Self::Unrecognized(response) => Some(response.code()),
            Self::Raw(_) => None,
        }
    }

    /// Returns the structured response, if this is one (including the
    /// unrecognized variant).
    #[must_use]
    pub fn as_structured(&self) -> Option<&Response> {
        match self {
            Self::Structured(response) | Self::Unrecognized(response) => Some(response),
            Self::Raw(_) => None,
        }
    }

    /// Returns the raw reply, if this is one.
    #[must_use]
    pub fn as_raw(&self) -> Option<&RawReply> {
        match self {
            Self::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    /// Returns the retained raised value of an unrecognized reply,
    /// downcast to `T`.
    #[must_use]
    pub fn raised_value<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Self::Unrecognized(response) => response.internal::<T>(RAISED_VALUE_KEY),
            _ => None,
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Structured(response)
    }
}

impl From<RawReply> for Reply {
    fn from(raw: RawReply) -> Self {
        Self::Raw(raw)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(response) => write!(f, "{response}"),
            Self::Raw(raw) => write!(f, "raw {} ({} bytes)", raw.status(), raw.body().len()),
            Self::Unrecognized(response) => write!(f, "unrecognized: {response}"),
        }
    }
}

impl std::error::Error for Reply {}
