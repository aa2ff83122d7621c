//! Frame header codec.
//!
//! The header travels as a CBOR array of `[tag, value]` pairs so fields can
//! be added later without breaking older peers: pairs with unknown tags are
//! skipped on decode.

use std::collections::BTreeMap;

use ciborium::Value;
use strum::{Display, EnumString, IntoStaticStr};

use super::errors::{DecodeError, EncodeError};
use super::frame::encode_value;

/// Constant tag identifying Switchyard frames.
pub const PROTOCOL_TAG: &str = "switchyard";

/// Protocol version spoken by this gateway.
pub const PROTOCOL_VERSION: u32 = 1;

const TAG_PROTOCOL: u8 = 0;
const TAG_VERSION: u8 = 1;
const TAG_ID: u8 = 2;
const TAG_ACTION: u8 = 3;
const TAG_PAYLOAD: u8 = 4;

/// Frame actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
pub enum Action {
    /// Open (or re-open) a subscription under the frame id.
    #[strum(serialize = "client:subscribe")]
    Subscribe,
    /// Stop the subscription with the frame id.
    #[strum(serialize = "client:unsubscribe")]
    Unsubscribe,
    /// Read a subscription handler's current value once.
    #[strum(serialize = "client:once")]
    Once,
    /// Run a mutation handler once.
    #[strum(serialize = "client:mutate")]
    Mutate,
    /// Server-to-client value, response, or error.
    #[strum(serialize = "server:update")]
    Update,
}

impl Action {
    /// Wire spelling of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns `true` for actions a client may send.
    #[must_use]
    pub const fn is_client(self) -> bool {
        !matches!(self, Self::Update)
    }
}

/// Envelope preceding every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    id: String,
    action: Action,
    payload: BTreeMap<String, Value>,
}

impl Header {
    /// Creates a header with an empty payload map.
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
            payload: BTreeMap::new(),
        }
    }

    /// Adds or replaces one payload entry.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Convenience for the `handler` payload entry every client frame carries.
    #[must_use]
    pub fn with_handler(self, handler: impl Into<String>) -> Self {
        self.with_payload("handler", handler.into())
    }

    /// Correlation id; doubles as the subscription id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Frame action.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Inline metadata.
    #[must_use]
    pub const fn payload(&self) -> &BTreeMap<String, Value> {
        &self.payload
    }

    /// Returns a payload entry when it is a text string.
    #[must_use]
    pub fn payload_text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_text)
    }

    /// Name of the handler a client frame addresses.
    #[must_use]
    pub fn handler(&self) -> Option<&str> {
        self.payload_text("handler")
    }

    /// Builds the CBOR representation of the header.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let payload = self
            .payload
            .iter()
            .map(|(key, value)| (Value::Text(key.clone()), value.clone()))
            .collect();
        Value::Array(vec![
            pair(TAG_PROTOCOL, Value::Text(PROTOCOL_TAG.to_owned())),
            pair(TAG_VERSION, Value::Integer(PROTOCOL_VERSION.into())),
            pair(TAG_ID, Value::Text(self.id.clone())),
            pair(TAG_ACTION, Value::Text(self.action.as_str().to_owned())),
            pair(TAG_PAYLOAD, Value::Map(payload)),
        ])
    }

    /// Encodes the header as a standalone chunk.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if a payload value cannot be serialised.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut bytes = Vec::new();
        encode_value(&self.to_value(), &mut bytes)?;
        Ok(bytes)
    }

    /// Decodes a buffer holding exactly one header chunk.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the bytes are not CBOR, when anything
    /// follows the header, or when [`Header::from_value`] rejects it.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = bytes;
        let value: Value = ciborium::from_reader(&mut cursor)
            .map_err(|error| DecodeError::malformed(error.to_string()))?;
        if !cursor.is_empty() {
            return Err(DecodeError::TrailingBytes {
                remaining: cursor.len(),
            });
        }
        Self::from_value(value)
    }

    /// Interprets an already decoded chunk as a header.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the value is not a list of `[integer,
    /// value]` pairs, if the protocol tag or version is unrecognised, or if
    /// a required field is missing or mistyped.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Array(entries) = value else {
            return Err(DecodeError::header_shape("expected an array of fields"));
        };

        let mut fields = HeaderFields::default();
        for entry in entries {
            let (tag, field) = split_pair(entry)?;
            fields.accept(tag, field)?;
        }
        fields.finish()
    }
}

fn pair(tag: u8, value: Value) -> Value {
    Value::Array(vec![Value::Integer(tag.into()), value])
}

fn split_pair(entry: Value) -> Result<(i128, Value), DecodeError> {
    let Value::Array(mut parts) = entry else {
        return Err(DecodeError::header_shape("field is not a [tag, value] pair"));
    };
    if parts.len() != 2 {
        return Err(DecodeError::header_shape(format!(
            "field has {} elements, expected 2",
            parts.len()
        )));
    }
    let value = parts.pop();
    let tag = parts.pop();
    match (tag, value) {
        (Some(Value::Integer(tag)), Some(value)) => Ok((i128::from(tag), value)),
        _ => Err(DecodeError::header_shape("field tag is not an integer")),
    }
}

#[derive(Default)]
struct HeaderFields {
    protocol: Option<String>,
    version: Option<i128>,
    id: Option<String>,
    action: Option<Action>,
    payload: Option<BTreeMap<String, Value>>,
}

impl HeaderFields {
    fn accept(&mut self, tag: i128, value: Value) -> Result<(), DecodeError> {
        match tag {
            t if t == i128::from(TAG_PROTOCOL) => {
                self.protocol = Some(expect_text(value, "protocol")?);
            }
            t if t == i128::from(TAG_VERSION) => match value {
                Value::Integer(version) => self.version = Some(i128::from(version)),
                _ => return Err(DecodeError::header_shape("version is not an integer")),
            },
            t if t == i128::from(TAG_ID) => {
                self.id = Some(expect_text(value, "id")?);
            }
            t if t == i128::from(TAG_ACTION) => {
                let action = expect_text(value, "action")?;
                let parsed = action
                    .parse::<Action>()
                    .map_err(|_| DecodeError::UnknownAction { action })?;
                self.action = Some(parsed);
            }
            t if t == i128::from(TAG_PAYLOAD) => {
                self.payload = Some(expect_payload(value)?);
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<Header, DecodeError> {
        let protocol = self
            .protocol
            .ok_or(DecodeError::MissingField { field: "protocol" })?;
        if protocol != PROTOCOL_TAG {
            return Err(DecodeError::UnknownProtocol { tag: protocol });
        }
        let version = self
            .version
            .ok_or(DecodeError::MissingField { field: "version" })?;
        if version != i128::from(PROTOCOL_VERSION) {
            return Err(DecodeError::UnsupportedVersion { version });
        }
        Ok(Header {
            id: self.id.ok_or(DecodeError::MissingField { field: "id" })?,
            action: self
                .action
                .ok_or(DecodeError::MissingField { field: "action" })?,
            payload: self.payload.unwrap_or_default(),
        })
    }
}

fn expect_text(value: Value, field: &'static str) -> Result<String, DecodeError> {
    match value {
        Value::Text(text) => Ok(text),
        _ => Err(DecodeError::header_shape(format!("{field} is not a string"))),
    }
}

fn expect_payload(value: Value) -> Result<BTreeMap<String, Value>, DecodeError> {
    let Value::Map(entries) = value else {
        return Err(DecodeError::header_shape("payload is not a map"));
    };
    entries
        .into_iter()
        .map(|(key, value)| match key {
            Value::Text(key) => Ok((key, value)),
            _ => Err(DecodeError::header_shape("payload keys must be strings")),
        })
        .collect()
}
