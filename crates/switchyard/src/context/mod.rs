//! Per-invocation state handed to handlers.
//!
//! An [`InvocationContext`] bundles the still-undecoded payload of one frame,
//! the raw transport request it arrived on, and the [`Scope`] that owns every
//! resource opened while serving it. Handlers read their validated request
//! through [`InvocationContext::request`]; the gateway closes the context when
//! the subscription is replaced or removed, or when a one-shot completes.

mod scope;
mod slot;

use std::fmt;
use std::sync::{Mutex, PoisonError};

use axum::http::request::Parts;
use bytes::Bytes;

use crate::dispatch::GatewayError;
use crate::protocol::{Action, PullSequence};
use crate::shape::RequestShape;

pub use self::scope::Scope;
pub use self::slot::ContextSlot;

/// Transport request an invocation arrived on.
#[derive(Debug)]
pub enum RawRequest {
    /// A complete WebSocket binary message.
    Frame(Bytes),
    /// The head of an HTTP request; the body feeds the pull sequence.
    Http(Parts),
}

/// Resources and request data for one handler invocation.
pub struct InvocationContext {
    id: String,
    handler: String,
    action: Action,
    raw: RawRequest,
    pull: Mutex<Option<PullSequence>>,
    scope: Scope,
}

impl InvocationContext {
    /// Assembles a context from a decoded header and its remaining payload.
    pub fn new(
        id: impl Into<String>,
        handler: impl Into<String>,
        action: Action,
        raw: RawRequest,
        pull: PullSequence,
        scope: Scope,
    ) -> Self {
        Self {
            id: id.into(),
            handler: handler.into(),
            action,
            raw,
            pull: Mutex::new(Some(pull)),
            scope,
        }
    }

    /// Correlation or subscription id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the addressed handler.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Action of the frame that created the context.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Transport request the invocation arrived on.
    #[must_use]
    pub const fn raw(&self) -> &RawRequest {
        &self.raw
    }

    /// Scope owning the invocation's resources.
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Decodes the payload as `R`.
    ///
    /// The payload can be consumed once. Decoding is abandoned as soon as the
    /// scope closes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PayloadConsumed`] on a second call,
    /// [`GatewayError::Cancelled`] if the scope closes first, and the
    /// decode, exhaustion, or validation error raised by the payload
    /// otherwise.
    pub async fn request<R: RequestShape>(&self) -> Result<R, GatewayError> {
        let mut pull = self.take_pull()?;
        tokio::select! {
            biased;
            () = self.scope.cancelled() => Err(GatewayError::Cancelled),
            parsed = R::parse(&mut pull) => parsed.map_err(GatewayError::from),
        }
    }

    fn take_pull(&self) -> Result<PullSequence, GatewayError> {
        if self.scope.is_closed() {
            return Err(GatewayError::Cancelled);
        }
        self.pull
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(GatewayError::PayloadConsumed)
    }

    /// Releases buffered payload bytes and closes the scope.
    ///
    /// Returns `true` only for the call that closed the scope.
    pub fn close(&self) -> bool {
        drop(
            self.pull
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        self.scope.close()
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("id", &self.id)
            .field("handler", &self.handler)
            .field("action", &self.action)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
