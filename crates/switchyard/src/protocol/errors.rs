//! Error types raised while encoding or decoding frames.

use thiserror::Error;

use crate::shape::ValidationError;

/// Raised when bytes cannot be decoded into a well-formed chunk or header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are not valid CBOR.
    #[error("malformed chunk: {message}")]
    Malformed { message: String },

    /// The payload ended part-way through a chunk.
    #[error("truncated chunk: {remaining} trailing bytes do not form a value")]
    Truncated { remaining: usize },

    /// A header-only buffer carried bytes after the header.
    #[error("unexpected {remaining} bytes after header")]
    TrailingBytes { remaining: usize },

    /// The header is not a list of `[tag, value]` pairs.
    #[error("header shape mismatch: {message}")]
    HeaderShape { message: String },

    /// The header names a different protocol.
    #[error("unrecognised protocol tag '{tag}'")]
    UnknownProtocol { tag: String },

    /// The header names a protocol version this gateway does not speak.
    #[error("unsupported protocol version {version}")]
    UnsupportedVersion { version: i128 },

    /// The header's action string is not one of the known actions.
    #[error("unknown action '{action}'")]
    UnknownAction { action: String },

    /// A required header field is absent.
    #[error("header is missing the {field} field")]
    MissingField { field: &'static str },

    /// A single chunk grew past the configured limit before it completed.
    #[error("chunk exceeds the {limit} byte limit")]
    ChunkTooLarge { limit: usize },

    /// The underlying body stream failed.
    #[error("failed to read request body: {message}")]
    Body { message: String },
}

impl DecodeError {
    /// Creates a malformed-chunk error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a header shape error.
    pub fn header_shape(message: impl Into<String>) -> Self {
        Self::HeaderShape {
            message: message.into(),
        }
    }

    /// Creates a body read error.
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body {
            message: message.into(),
        }
    }
}

/// Raised when a consumer pulls a chunk that was never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payload exhausted after {pulled} chunks")]
pub struct StreamExhaustedError {
    /// Chunks successfully pulled before the sequence ran dry.
    pub pulled: usize,
}

/// Raised when a value cannot be written as CBOR.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to encode chunk: {message}")]
pub struct EncodeError {
    message: String,
}

impl EncodeError {
    /// Creates an encode error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Any failure surfaced while pulling and validating payload chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Malformed bytes.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Too few chunks.
    #[error(transparent)]
    Exhausted(#[from] StreamExhaustedError),
    /// A decoded chunk does not match the declared shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
