//! Lazy, pull-based chunk decoding.
//!
//! A [`PullSequence`] owns whatever bytes of a frame have arrived so far and
//! decodes one chunk per [`PullSequence::pull`] call. Bytes for later chunks
//! are only read from the source when a consumer asks for them, so a handler
//! that consumes `K` chunks never causes chunk `K + 1` to be decoded.

use std::error::Error as StdError;
use std::io;

use bytes::{Buf, Bytes, BytesMut};
use ciborium::Value;
use futures::StreamExt;
use futures::stream::{BoxStream, Stream};
use serde::de::DeserializeOwned;

use super::errors::{DecodeError, ProtocolError, StreamExhaustedError};
use crate::shape::ValidationError;

/// Incrementally delivered frame bytes.
pub type ByteStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Cursor over the chunks of one frame.
pub struct PullSequence {
    buffer: BytesMut,
    source: Option<ByteStream>,
    pulled: usize,
    max_chunk_bytes: usize,
}

impl std::fmt::Debug for PullSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullSequence")
            .field("buffered", &self.buffer.len())
            .field("streaming", &self.source.is_some())
            .field("pulled", &self.pulled)
            .finish()
    }
}

impl PullSequence {
    /// Wraps a frame that arrived in one piece.
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            buffer: BytesMut::from(bytes.as_ref()),
            source: None,
            pulled: 0,
            max_chunk_bytes: usize::MAX,
        }
    }

    /// Wraps a body that is still arriving.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            buffer: BytesMut::new(),
            source: Some(stream.map(|item| item.map_err(io::Error::other)).boxed()),
            pulled: 0,
            max_chunk_bytes: usize::MAX,
        }
    }

    /// Caps the number of bytes a single incomplete chunk may buffer.
    #[must_use]
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.max_chunk_bytes = limit.max(1);
        self
    }

    /// Number of chunks decoded so far.
    #[must_use]
    pub const fn pulled(&self) -> usize {
        self.pulled
    }

    /// Decodes the next chunk.
    ///
    /// # Errors
    ///
    /// Returns [`StreamExhaustedError`] when no bytes remain, and
    /// [`DecodeError`] when the remaining bytes are malformed, truncated, or
    /// exceed the chunk limit.
    pub async fn pull(&mut self) -> Result<Value, ProtocolError> {
        loop {
            if let Some((value, consumed)) = self.try_decode()? {
                self.buffer.advance(consumed);
                self.pulled += 1;
                return Ok(value);
            }
            if !self.fill().await? {
                if self.buffer.is_empty() {
                    return Err(StreamExhaustedError {
                        pulled: self.pulled,
                    }
                    .into());
                }
                return Err(DecodeError::Truncated {
                    remaining: self.buffer.len(),
                }
                .into());
            }
        }
    }

    /// Decodes the next chunk as `T`.
    ///
    /// `index` is the position of the chunk within the handler's request and
    /// `expected` names the declared type in validation errors.
    ///
    /// # Errors
    ///
    /// As [`PullSequence::pull`], plus [`ValidationError`] when the chunk does
    /// not deserialise into `T`.
    pub async fn pull_as<T>(&mut self, index: usize, expected: &'static str) -> Result<T, ProtocolError>
    where
        T: DeserializeOwned,
    {
        let value = self.pull().await?;
        value
            .deserialized::<T>()
            .map_err(|error| ValidationError::new(index, expected, error.to_string()).into())
    }

    fn try_decode(&self) -> Result<Option<(Value, usize)>, DecodeError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let mut cursor: &[u8] = &self.buffer;
        match ciborium::from_reader::<Value, _>(&mut cursor) {
            Ok(value) => Ok(Some((value, self.buffer.len() - cursor.len()))),
            Err(ciborium::de::Error::Io(_)) => {
                if self.buffer.len() > self.max_chunk_bytes {
                    return Err(DecodeError::ChunkTooLarge {
                        limit: self.max_chunk_bytes,
                    });
                }
                Ok(None)
            }
            Err(error) => Err(DecodeError::malformed(error.to_string())),
        }
    }

    /// Reads more bytes from the source; `false` once the source has ended.
    async fn fill(&mut self) -> Result<bool, DecodeError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };
        loop {
            match source.next().await {
                Some(Ok(bytes)) if bytes.is_empty() => {}
                Some(Ok(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    return Ok(true);
                }
                Some(Err(error)) => {
                    self.source = None;
                    return Err(DecodeError::body(error.to_string()));
                }
                None => {
                    self.source = None;
                    return Ok(false);
                }
            }
        }
    }
}
