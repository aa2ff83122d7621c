//! Inbound frame decoding.

use crate::context::{InvocationContext, RawRequest, Scope};
use crate::protocol::{DecodeError, Header, ProtocolError, PullSequence};

use super::errors::GatewayError;

/// A frame whose header has been decoded and whose payload has not.
#[derive(Debug)]
pub struct InboundFrame {
    header: Header,
    payload: PullSequence,
}

impl InboundFrame {
    /// Pulls and decodes chunk zero.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Decode`] if the frame is empty or the first
    /// chunk is not a valid header.
    pub async fn read(mut pull: PullSequence) -> Result<Self, GatewayError> {
        let value = pull.pull().await.map_err(|error| match error {
            ProtocolError::Exhausted(_) => {
                GatewayError::Decode(DecodeError::malformed("frame has no header chunk"))
            }
            other => GatewayError::from(other),
        })?;
        let header = Header::from_value(value)?;
        Ok(Self {
            header,
            payload: pull,
        })
    }

    /// Decoded header.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Name of the addressed handler.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the header payload has no `handler` string.
    pub fn handler(&self) -> Result<&str, GatewayError> {
        self.header
            .handler()
            .filter(|name| !name.is_empty())
            .ok_or_else(GatewayError::missing_handler)
    }

    /// Moves the undecoded payload into a new invocation context.
    ///
    /// # Errors
    ///
    /// As [`InboundFrame::handler`].
    pub fn into_context(self, raw: RawRequest, scope: Scope) -> Result<InvocationContext, GatewayError> {
        let handler = self.handler()?.to_owned();
        Ok(InvocationContext::new(
            self.header.id(),
            handler,
            self.header.action(),
            raw,
            self.payload,
            scope,
        ))
    }
}
