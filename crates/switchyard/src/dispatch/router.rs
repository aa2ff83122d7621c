//! Handler resolution and invocation.

use std::future::Future;

use ciborium::Value;
use tracing::{debug, warn};

use crate::context::InvocationContext;
use crate::protocol::Action;
use crate::registry::{Computation, HandlerEntry, HandlerKind, Registry, UpdateStream};

use super::errors::GatewayError;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes invocations to registered handlers.
#[derive(Debug, Clone)]
pub struct HandlerRouter {
    registry: Registry,
}

impl HandlerRouter {
    /// Creates a router over a built registry.
    #[must_use]
    pub const fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Registry the router consults.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Finds the handler that serves `action` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnsupportedAction`] for actions that do not
    /// invoke a handler and [`GatewayError::HandlerNotFound`] when the
    /// relevant registry has no such name.
    pub fn resolve(&self, action: Action, name: &str) -> Result<&HandlerEntry, GatewayError> {
        let kind = match action {
            Action::Subscribe | Action::Once => HandlerKind::Subscription,
            Action::Mutate => HandlerKind::Mutation,
            other => return Err(GatewayError::unsupported_action(other)),
        };
        self.registry
            .lookup(kind, name)
            .ok_or_else(|| GatewayError::handler_not_found(kind, name))
    }

    /// Validates the request and starts the subscription computation.
    ///
    /// The returned stream yields encoded values until the context's scope
    /// closes. The caller owns the context and must close it on failure.
    pub(crate) async fn start_subscription(
        &self,
        context: &InvocationContext,
    ) -> Result<UpdateStream, GatewayError> {
        let entry = self.resolve(Action::Subscribe, context.handler())?;
        debug!(
            target: DISPATCH_TARGET,
            id = context.id(),
            handler = context.handler(),
            "starting subscription"
        );
        match entry.computation() {
            Computation::Subscription(handler) => {
                within_scope(context, handler.start(context)).await
            }
            Computation::Mutation(_) => Err(GatewayError::handler_not_found(
                HandlerKind::Subscription,
                context.handler(),
            )),
        }
    }

    /// Runs a once or mutate invocation and closes its context.
    ///
    /// The context is closed on every path, including failures.
    pub async fn run_once(&self, context: InvocationContext) -> Result<Value, GatewayError> {
        let outcome = self.invoke_once(&context).await;
        context.close();
        outcome
    }

    async fn invoke_once(&self, context: &InvocationContext) -> Result<Value, GatewayError> {
        let entry = self.resolve(context.action(), context.handler())?;
        debug!(
            target: DISPATCH_TARGET,
            action = %context.action(),
            id = context.id(),
            handler = context.handler(),
            "invoking handler"
        );
        match (context.action(), entry.computation()) {
            (Action::Once, Computation::Subscription(handler)) => {
                within_scope(context, handler.once(context)).await
            }
            (Action::Mutate, Computation::Mutation(handler)) => {
                within_scope(context, handler.run(context)).await
            }
            (action, _) => Err(GatewayError::unsupported_action(action)),
        }
    }
}

/// Abandons `work` as soon as the invocation scope closes.
async fn within_scope<T>(
    context: &InvocationContext,
    work: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::select! {
        biased;
        () = context.scope().cancelled() => Err(GatewayError::Cancelled),
        outcome = work => outcome,
    }
}

/// Logs a failure caught at the dispatch boundary.
pub(crate) fn log_failure(action: Action, id: &str, handler: Option<&str>, error: &GatewayError) {
    warn!(
        target: DISPATCH_TARGET,
        action = %action,
        id,
        handler = handler.unwrap_or(""),
        kind = error.kind(),
        error = %error,
        "dispatch failed"
    );
}
