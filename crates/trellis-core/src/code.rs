//! Standard failure-kind taxonomy.
//!
//! Every structured reply carries a [`Code`]. The taxonomy is deliberately
//! transport-agnostic: each kind maps to a default wire status and message,
//! and exposes predicates so any layer can make retry decisions without
//! inspecting message strings.

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Symbolic outcome codes.
///
/// Grouped as: success (`Ok`), client faults, client-initiated termination
/// (`Canceled`), rate/quota, and server faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    /// The operation completed successfully.
    Ok,

    // Client faults: the request is invalid, unauthorized, or cannot be
    // fulfilled as sent.
    /// A request argument is invalid.
    InvalidArgument,
    /// The request is malformed or cannot be processed.
    BadRequest,
    /// A requested resource does not exist.
    NotFound,
    /// The resource being created already exists.
    AlreadyExists,
    /// The caller lacks permission for the operation.
    PermissionDenied,
    /// Authentication is required and has failed or is missing.
    Unauthenticated,
    /// A precondition for the operation is not met.
    FailedPrecondition,
    /// The operation was attempted past the valid range.
    OutOfRange,
    /// The operation was aborted, typically by a concurrency conflict.
    Aborted,

    /// The client terminated the request.
    Canceled,

    // Rate/quota: the client is behaving correctly but must slow down.
    /// A per-caller resource quota is exhausted.
    ResourceExhausted,
    /// The caller exceeded a rate limit.
    TooManyRequests,

    // Server faults: the request was valid, but the service failed.
    /// An error of unknown origin; also the code every unrecognized raised
    /// value resolves to.
    Unknown,
    /// A deadline elapsed before the operation completed.
    DeadlineExceeded,
    /// The operation is not implemented.
    Unimplemented,
    /// An internal service error.
    Internal,
    /// The service is currently unavailable.
    Unavailable,
    /// Unrecoverable data loss or corruption.
    DataLoss,
}

/// 499 Client Closed Request is widely used but not a named constant in the
/// `http` crate.
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl Code {
    /// Returns the default wire status for this code.
    #[must_use]
    pub fn default_status(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::InvalidArgument | Self::BadRequest | Self::OutOfRange => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::Aborted => StatusCode::CONFLICT,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            Self::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::BAD_REQUEST),
            Self::ResourceExhausted | Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown | Self::Internal | Self::DataLoss => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the default human-readable message for this code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid argument",
            Self::BadRequest => "bad request",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::PermissionDenied => "permission denied",
            Self::Unauthenticated => "unauthenticated",
            Self::FailedPrecondition => "failed precondition",
            Self::OutOfRange => "out of range",
            Self::Aborted => "aborted",
            Self::Canceled => "canceled",
            Self::ResourceExhausted => "resource exhausted",
            Self::TooManyRequests => "too many requests",
            Self::Unknown => "unknown",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Unimplemented => "unimplemented",
            Self::Internal => "internal error",
            Self::Unavailable => "unavailable",
            Self::DataLoss => "data loss",
        }
    }

    /// Returns the wire form of this code, e.g. `INVALID_ARGUMENT`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Aborted => "ABORTED",
            Self::Canceled => "CANCELED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::Unknown => "UNKNOWN",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
        }
    }

    /// Reports whether this code is a client-side fault.
    #[must_use]
    pub const fn is_client_fault(self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::BadRequest
                | Self::NotFound
                | Self::AlreadyExists
                | Self::PermissionDenied
                | Self::Unauthenticated
                | Self::FailedPrecondition
                | Self::OutOfRange
                | Self::Aborted
        )
    }

    /// Reports whether this code is a server-side fault.
    #[must_use]
    pub const fn is_server_fault(self) -> bool {
        matches!(
            self,
            Self::Unknown
                | Self::DeadlineExceeded
                | Self::Unimplemented
                | Self::Internal
                | Self::Unavailable
                | Self::DataLoss
        )
    }

    /// Reports whether a retried request may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Unavailable
                | Self::DeadlineExceeded
                | Self::ResourceExhausted
                | Self::TooManyRequests
                | Self::Internal
        )
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Code; 19] = [
        Code::Ok,
        Code::InvalidArgument,
        Code::BadRequest,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::Unauthenticated,
        Code::FailedPrecondition,
        Code::OutOfRange,
        Code::Aborted,
        Code::Canceled,
        Code::ResourceExhausted,
        Code::TooManyRequests,
        Code::Unknown,
        Code::DeadlineExceeded,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
    ];

    #[test]
    fn test_fault_classes_are_disjoint() {
        for code in ALL {
            assert!(
                !(code.is_client_fault() && code.is_server_fault()),
                "{code} claims both fault classes"
            );
        }
    }

    #[test]
    fn test_default_status_mapping() {
        assert_eq!(Code::Ok.default_status(), StatusCode::OK);
        assert_eq!(Code::NotFound.default_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Code::PermissionDenied.default_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Code::TooManyRequests.default_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(Code::Canceled.default_status().as_u16(), 499);
        assert_eq!(
            Code::Unknown.default_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable_codes() {
        assert!(Code::Unavailable.is_retryable());
        assert!(Code::TooManyRequests.is_retryable());
        assert!(Code::DeadlineExceeded.is_retryable());
        assert!(!Code::PermissionDenied.is_retryable());
        assert!(!Code::NotFound.is_retryable());
    }

    #[test]
    fn test_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&Code::InvalidArgument).unwrap();
        assert_eq!(json, "\"INVALID_ARGUMENT\"");

        let parsed: Code = serde_json::from_str("\"TOO_MANY_REQUESTS\"").unwrap();
        assert_eq!(parsed, Code::TooManyRequests);
    }

    #[test]
    fn test_display_matches_wire_form() {
        for code in ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }
}
