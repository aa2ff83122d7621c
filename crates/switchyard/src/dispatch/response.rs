//! Outbound frame helpers.

use bytes::Bytes;
use ciborium::Value;
use tracing::error;

use crate::protocol::FrameBuilder;

use super::errors::GatewayError;
use super::router::DISPATCH_TARGET;

/// Encodes a subscription update.
pub(crate) fn update_frame(id: &str, handler: &str, value: &Value) -> Result<Bytes, GatewayError> {
    FrameBuilder::update(id, handler, value).map_err(GatewayError::from)
}

/// Encodes the single response to a once or mutate request.
pub(crate) fn complete_frame(
    id: &str,
    handler: &str,
    value: &Value,
) -> Result<Bytes, GatewayError> {
    FrameBuilder::complete(id, handler, value).map_err(GatewayError::from)
}

/// Encodes an error report, or logs and returns `None` if even that fails.
pub(crate) fn error_frame(id: &str, failure: &GatewayError) -> Option<Bytes> {
    match FrameBuilder::error(id, failure.kind(), &failure.to_string()) {
        Ok(frame) => Some(frame),
        Err(encode_error) => {
            error!(
                target: DISPATCH_TARGET,
                id,
                kind = failure.kind(),
                error = %encode_error,
                "failed to encode error frame"
            );
            None
        }
    }
}
