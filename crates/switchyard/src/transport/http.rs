//! HTTP request dispatcher.
//!
//! `POST /rpc` carries exactly one `client:once` or `client:mutate` frame.
//! The body is streamed into the frame's pull sequence, so payload chunks
//! are decoded as the handler asks for them. A successful call answers 200
//! with the single encoded result; failures answer an empty body and the
//! status of the [`GatewayError`].

use axum::http::StatusCode;
use axum::http::request::Parts;
use bytes::Bytes;
use tracing::debug;

use crate::context::{RawRequest, Scope};
use crate::dispatch::{GatewayError, HandlerRouter, InboundFrame, log_failure};
use crate::protocol::{Action, PullSequence, encode_value};

use super::TRANSPORT_TARGET;

/// Status and body of an HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Response status.
    pub status: StatusCode,
    /// Response body; empty on failure.
    pub body: Bytes,
}

impl HttpReply {
    fn failure(error: &GatewayError) -> Self {
        Self {
            status: error.http_status(),
            body: Bytes::new(),
        }
    }
}

/// Runs one-shot invocations received over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    router: HandlerRouter,
}

impl HttpDispatcher {
    /// Creates a dispatcher over `router`.
    #[must_use]
    pub const fn new(router: HandlerRouter) -> Self {
        Self { router }
    }

    /// Decodes the frame in `pull`, runs it, and maps the outcome.
    ///
    /// Dropping the returned future closes the invocation's scope.
    pub async fn dispatch(&self, parts: Parts, pull: PullSequence) -> HttpReply {
        let frame = match InboundFrame::read(pull).await {
            Ok(frame) => frame,
            Err(error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    kind = error.kind(),
                    error = %error,
                    "undecodable request body"
                );
                return HttpReply::failure(&error);
            }
        };

        let id = frame.header().id().to_owned();
        let action = frame.header().action();
        let handler = frame.header().handler().map(str::to_owned);
        let outcome = match action {
            Action::Once | Action::Mutate => self.invoke(frame, parts).await,
            other => Err(GatewayError::unsupported_action(other)),
        };

        match outcome {
            Ok(body) => HttpReply {
                status: StatusCode::OK,
                body,
            },
            Err(error) => {
                log_failure(action, &id, handler.as_deref(), &error);
                HttpReply::failure(&error)
            }
        }
    }

    async fn invoke(&self, frame: InboundFrame, parts: Parts) -> Result<Bytes, GatewayError> {
        let context = frame.into_context(RawRequest::Http(parts), Scope::new())?;
        let value = self.router.run_once(context).await?;
        let mut body = Vec::new();
        encode_value(&value, &mut body)?;
        Ok(Bytes::from(body))
    }
}
