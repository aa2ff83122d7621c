//! Frame encoding and decoding helpers for transport-level tests.

use std::time::Duration;

use bytes::Bytes;
use ciborium::Value;
use tokio::sync::mpsc;

use crate::protocol::{Action, FrameBuilder, Header, PullSequence};

/// Encodes a client frame; `handler` is omitted from the payload when `None`.
pub fn encode_frame(action: Action, id: &str, handler: Option<&str>, chunks: &[Value]) -> Bytes {
    let header = match handler {
        Some(name) => Header::new(id, action).with_handler(name),
        None => Header::new(id, action),
    };
    chunks
        .iter()
        .try_fold(FrameBuilder::new(&header).expect("encode header"), |frame, chunk| {
            frame.chunk(chunk)
        })
        .expect("encode chunks")
        .finish()
}

/// A server frame split into its header and optional value chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub header: Header,
    pub value: Option<Value>,
}

impl DecodedFrame {
    /// Decodes `bytes`, panicking on malformed frames.
    pub async fn decode(bytes: Bytes) -> Self {
        let mut pull = PullSequence::from_bytes(bytes);
        let header = Header::from_value(pull.pull().await.expect("header chunk"))
            .expect("decode header");
        let value = pull.pull().await.ok();
        Self { header, value }
    }

    /// The `error.kind` string of an error frame.
    pub fn error_kind(&self) -> Option<&str> {
        let Some(Value::Map(entries)) = self.header.payload().get("error") else {
            return None;
        };
        entries.iter().find_map(|(key, value)| match (key, value) {
            (Value::Text(key), Value::Text(kind)) if key == "kind" => Some(kind.as_str()),
            _ => None,
        })
    }

    /// Whether the frame answers a once or mutate request.
    pub fn is_complete(&self) -> bool {
        matches!(self.header.payload().get("complete"), Some(Value::Bool(true)))
    }
}

/// Waits up to two seconds for the next outbound frame.
pub async fn next_frame(frames: &mut mpsc::Receiver<Bytes>) -> DecodedFrame {
    let bytes = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("frame within timeout")
        .expect("peer queue open");
    DecodedFrame::decode(bytes).await
}

/// Drains frames until none arrives within `quiet`.
pub async fn drain_frames(frames: &mut mpsc::Receiver<Bytes>, quiet: Duration) -> Vec<DecodedFrame> {
    let mut drained = Vec::new();
    while let Ok(Some(bytes)) = tokio::time::timeout(quiet, frames.recv()).await {
        drained.push(DecodedFrame::decode(bytes).await);
    }
    drained
}

/// CBOR integer.
pub fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

/// CBOR map with text keys.
pub fn map(entries: &[(&str, Value)]) -> Value {
    Value::Map(
        entries
            .iter()
            .map(|(key, value)| (Value::Text((*key).to_owned()), value.clone()))
            .collect(),
    )
}
