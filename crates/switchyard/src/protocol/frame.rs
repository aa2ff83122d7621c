//! Outbound frame assembly.

use bytes::Bytes;
use ciborium::Value;
use serde::Serialize;

use super::errors::EncodeError;
use super::header::{Action, Header};

/// Serialises one value as a standalone CBOR chunk appended to `out`.
///
/// # Errors
///
/// Returns [`EncodeError`] if `value` cannot be represented in CBOR.
pub fn encode_value<T>(value: &T, out: &mut Vec<u8>) -> Result<(), EncodeError>
where
    T: Serialize + ?Sized,
{
    ciborium::into_writer(value, out).map_err(|error| EncodeError::new(error.to_string()))
}

/// Concatenates a header and its value chunks into one frame.
#[derive(Debug)]
pub struct FrameBuilder {
    bytes: Vec<u8>,
}

impl FrameBuilder {
    /// Starts a frame with the given header as chunk zero.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the header payload cannot be encoded.
    pub fn new(header: &Header) -> Result<Self, EncodeError> {
        Ok(Self {
            bytes: header.encode()?,
        })
    }

    /// Appends one value chunk.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the value cannot be encoded.
    pub fn chunk<T>(mut self, value: &T) -> Result<Self, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        encode_value(value, &mut self.bytes)?;
        Ok(self)
    }

    /// Returns the assembled frame.
    #[must_use]
    pub fn finish(self) -> Bytes {
        Bytes::from(self.bytes)
    }

    /// A subscription update carrying one value chunk.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the value cannot be encoded.
    pub fn update<T>(id: &str, handler: &str, value: &T) -> Result<Bytes, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        let header = Header::new(id, Action::Update).with_handler(handler);
        Ok(Self::new(&header)?.chunk(value)?.finish())
    }

    /// The single response to a once or mutate request.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the value cannot be encoded.
    pub fn complete<T>(id: &str, handler: &str, value: &T) -> Result<Bytes, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        let header = Header::new(id, Action::Update)
            .with_handler(handler)
            .with_payload("complete", true);
        Ok(Self::new(&header)?.chunk(value)?.finish())
    }

    /// An error report; the frame carries no value chunks.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the header cannot be encoded.
    pub fn error(id: &str, kind: &str, message: &str) -> Result<Bytes, EncodeError> {
        let detail = Value::Map(vec![
            (Value::Text("kind".to_owned()), Value::Text(kind.to_owned())),
            (
                Value::Text("message".to_owned()),
                Value::Text(message.to_owned()),
            ),
        ]);
        let header = Header::new(id, Action::Update).with_payload("error", detail);
        Ok(Self::new(&header)?.finish())
    }
}
