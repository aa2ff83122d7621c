//! Error types for dispatch failures.
//!
//! Every failure that can reach a caller is a [`GatewayError`]. Each variant
//! maps to a stable `kind` string carried in error frames and to the HTTP
//! status returned by the `/rpc` endpoint.

use axum::http::StatusCode;
use thiserror::Error;

use crate::protocol::{Action, DecodeError, EncodeError, ProtocolError, StreamExhaustedError};
use crate::reactive::HandlerError;
use crate::registry::HandlerKind;
use crate::shape::ValidationError;

/// Errors surfaced while dispatching a frame to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Frame bytes or header could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The handler asked for more payload chunks than were sent.
    #[error(transparent)]
    StreamExhausted(#[from] StreamExhaustedError),

    /// A payload chunk does not match the handler's request shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No handler of the required kind is registered under the name.
    #[error("no {kind} handler named '{name}'")]
    HandlerNotFound { kind: HandlerKind, name: String },

    /// The handler computation failed.
    #[error("handler '{name}' failed: {message}")]
    HandlerExecution { name: String, message: String },

    /// The action is valid but not accepted on this path.
    #[error("action '{action}' is not supported here")]
    UnsupportedAction { action: Action },

    /// The invocation's payload was already consumed.
    #[error("request payload has already been consumed")]
    PayloadConsumed,

    /// The invocation scope closed before the work finished.
    #[error("invocation cancelled")]
    Cancelled,

    /// A response could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl GatewayError {
    /// Wire identifier carried in error frames.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::StreamExhausted(_) => "stream_exhausted",
            Self::Validation(_) => "validation",
            Self::HandlerNotFound { .. } => "handler_not_found",
            Self::HandlerExecution { .. } => "handler_execution",
            Self::UnsupportedAction { .. } => "unsupported_action",
            Self::PayloadConsumed => "payload_consumed",
            Self::Cancelled => "cancelled",
            Self::Encode(_) => "encode",
        }
    }

    /// Status returned to HTTP callers.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Decode(DecodeError::UnknownAction { .. })
            | Self::UnsupportedAction { .. }
            | Self::HandlerNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Decode(_) | Self::StreamExhausted(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::HandlerExecution { .. }
            | Self::PayloadConsumed
            | Self::Cancelled
            | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Creates a handler-not-found error.
    pub fn handler_not_found(kind: HandlerKind, name: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Wraps a failure raised by the named handler.
    pub fn handler_execution(name: impl Into<String>, error: &HandlerError) -> Self {
        Self::HandlerExecution {
            name: name.into(),
            message: error.message().to_owned(),
        }
    }

    /// Creates an unsupported action error.
    pub const fn unsupported_action(action: Action) -> Self {
        Self::UnsupportedAction { action }
    }

    /// A client frame that names no handler.
    pub const fn missing_handler() -> Self {
        Self::Decode(DecodeError::MissingField { field: "handler" })
    }
}

impl From<ProtocolError> for GatewayError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Decode(error) => Self::Decode(error),
            ProtocolError::Exhausted(error) => Self::StreamExhausted(error),
            ProtocolError::Validation(error) => Self::Validation(error),
        }
    }
}
