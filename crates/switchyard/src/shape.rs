//! Declared request shapes.
//!
//! Each handler declares the payload it expects as a tuple of deserialisable
//! types. [`RequestShape::parse`] pulls exactly one chunk per element, stops
//! at the first chunk that fails validation, and never touches chunks beyond
//! the declared arity.

use std::future::Future;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::protocol::{ProtocolError, PullSequence};

/// A payload chunk did not match the declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chunk {index} is not a valid {expected}: {message}")]
pub struct ValidationError {
    index: usize,
    expected: &'static str,
    message: String,
}

impl ValidationError {
    /// Creates a validation error for the chunk at `index`.
    pub fn new(index: usize, expected: &'static str, message: impl Into<String>) -> Self {
        Self {
            index,
            expected,
            message: message.into(),
        }
    }

    /// Position of the rejected chunk within the request.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Type the chunk was expected to hold.
    #[must_use]
    pub const fn expected(&self) -> &'static str {
        self.expected
    }

    /// Decoder explanation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A request type that can be read from a [`PullSequence`].
pub trait RequestShape: Sized + Send + 'static {
    /// Number of chunks the shape consumes.
    const CHUNKS: usize;

    /// Pulls and validates exactly [`Self::CHUNKS`] chunks.
    fn parse(pull: &mut PullSequence) -> impl Future<Output = Result<Self, ProtocolError>> + Send;
}

impl RequestShape for () {
    const CHUNKS: usize = 0;

    async fn parse(_pull: &mut PullSequence) -> Result<Self, ProtocolError> {
        Ok(())
    }
}

macro_rules! tuple_shape {
    ($count:expr; $($name:ident => $index:tt),+) => {
        impl<$($name),+> RequestShape for ($($name,)+)
        where
            $($name: DeserializeOwned + Send + 'static),+
        {
            const CHUNKS: usize = $count;

            async fn parse(pull: &mut PullSequence) -> Result<Self, ProtocolError> {
                Ok(($(
                    pull.pull_as::<$name>($index, std::any::type_name::<$name>()).await?,
                )+))
            }
        }
    };
}

tuple_shape!(1; A => 0);
tuple_shape!(2; A => 0, B => 1);
tuple_shape!(3; A => 0, B => 1, C => 2);
tuple_shape!(4; A => 0, B => 1, C => 2, D => 3);
