//! Binary framing shared by every transport.
//!
//! A frame is a run of independently decodable CBOR items ("chunks"). Chunk
//! zero is always the [`Header`]; the remaining chunks are handler payload
//! values that are decoded lazily through a [`PullSequence`].

mod errors;
mod frame;
mod header;
mod pull;

pub use self::errors::{DecodeError, EncodeError, ProtocolError, StreamExhaustedError};
pub use self::frame::{FrameBuilder, encode_value};
pub use self::header::{Action, Header, PROTOCOL_TAG, PROTOCOL_VERSION};
pub use self::pull::{ByteStream, PullSequence};
