//! Handler traits and their type-erased forms.

use std::future::Future;
use std::sync::Arc;

use ciborium::Value;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::context::InvocationContext;
use crate::dispatch::GatewayError;
use crate::protocol::EncodeError;
use crate::reactive::{HandlerError, Reactive};
use crate::shape::RequestShape;

/// Encoded values pushed by a running subscription.
pub(crate) type UpdateStream = BoxStream<'static, Result<Value, GatewayError>>;

/// A handler whose result is a reactive value.
///
/// The gateway validates the request declared by [`Self::Request`], calls
/// [`Self::subscribe`] once per invocation, and pushes every value the
/// returned [`Reactive`] takes until the invocation scope closes. The same
/// handler serves `client:once` by reading the reactive's current value.
pub trait SubscriptionHandler: Send + Sync + 'static {
    /// Payload chunks the handler expects.
    type Request: RequestShape;
    /// Value pushed to the client.
    type Response: Serialize + Clone + Send + Sync + 'static;

    /// Starts the computation.
    fn subscribe(
        &self,
        request: Self::Request,
        context: &InvocationContext,
    ) -> impl Future<Output = Result<Reactive<Self::Response>, HandlerError>> + Send;
}

/// A handler that performs one write and returns one result.
pub trait MutationHandler: Send + Sync + 'static {
    /// Payload chunks the handler expects.
    type Request: RequestShape;
    /// Value returned to the client.
    type Response: Serialize + Send + 'static;

    /// Performs the mutation.
    fn mutate(
        &self,
        request: Self::Request,
        context: &InvocationContext,
    ) -> impl Future<Output = Result<Self::Response, HandlerError>> + Send;
}

pub(crate) trait ErasedSubscription: Send + Sync {
    fn start<'a>(
        &'a self,
        context: &'a InvocationContext,
    ) -> BoxFuture<'a, Result<UpdateStream, GatewayError>>;

    fn once<'a>(&'a self, context: &'a InvocationContext)
    -> BoxFuture<'a, Result<Value, GatewayError>>;
}

pub(crate) trait ErasedMutation: Send + Sync {
    fn run<'a>(&'a self, context: &'a InvocationContext)
    -> BoxFuture<'a, Result<Value, GatewayError>>;
}

/// Computation stored in a registry entry.
#[derive(Clone)]
pub(crate) enum Computation {
    Subscription(Arc<dyn ErasedSubscription>),
    Mutation(Arc<dyn ErasedMutation>),
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, GatewayError> {
    Value::serialized(value).map_err(|error| EncodeError::new(error.to_string()).into())
}

async fn subscribe<H: SubscriptionHandler>(
    handler: &H,
    context: &InvocationContext,
) -> Result<Reactive<H::Response>, GatewayError> {
    let request = context.request::<H::Request>().await?;
    handler
        .subscribe(request, context)
        .await
        .map_err(|error| GatewayError::handler_execution(context.handler(), &error))
}

impl<H: SubscriptionHandler> ErasedSubscription for H {
    fn start<'a>(
        &'a self,
        context: &'a InvocationContext,
    ) -> BoxFuture<'a, Result<UpdateStream, GatewayError>> {
        Box::pin(async move {
            let reactive = subscribe(self, context).await?;
            let name = context.handler().to_owned();
            let stream = reactive
                .into_stream()
                .map(move |item| match item {
                    Ok(value) => encode(&value),
                    Err(error) => Err(GatewayError::handler_execution(&name, &error)),
                })
                .take_until(context.scope().token().clone().cancelled_owned());
            Ok(stream.boxed())
        })
    }

    fn once<'a>(
        &'a self,
        context: &'a InvocationContext,
    ) -> BoxFuture<'a, Result<Value, GatewayError>> {
        Box::pin(async move {
            let reactive = subscribe(self, context).await?;
            let current = reactive
                .current()
                .map_err(|error| GatewayError::handler_execution(context.handler(), &error))?;
            encode(&current)
        })
    }
}

impl<H: MutationHandler> ErasedMutation for H {
    fn run<'a>(
        &'a self,
        context: &'a InvocationContext,
    ) -> BoxFuture<'a, Result<Value, GatewayError>> {
        Box::pin(async move {
            let request = context.request::<H::Request>().await?;
            let response = self
                .mutate(request, context)
                .await
                .map_err(|error| GatewayError::handler_execution(context.handler(), &error))?;
            encode(&response)
        })
    }
}
