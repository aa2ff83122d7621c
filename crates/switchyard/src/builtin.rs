//! Diagnostic handlers shipped with the gateway.
//!
//! These are not business handlers. They give a freshly started gateway
//! something to answer with, and give the tests concrete subjects:
//!
//! - `ping`: constant `"pong"`.
//! - `clock`: tick count advancing on a fixed interval.
//! - `echo`: constant echo of its single request chunk.
//! - `counter` / `counter.add`: a shared integer; each mutation pushes the
//!   new total to every `counter` subscriber.

use std::time::Duration;

use ciborium::Value;
use tokio::time::{Instant, interval_at};

use crate::context::InvocationContext;
use crate::reactive::{HandlerError, Reactive, Signal};
use crate::registry::{MutationHandler, Registry, RegistryBuilder, RegistryError, SubscriptionHandler};

/// Tick interval used by [`registry`].
pub const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// Answers every request with `"pong"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

impl SubscriptionHandler for Ping {
    type Request = ();
    type Response = &'static str;

    async fn subscribe(
        &self,
        (): (),
        _context: &InvocationContext,
    ) -> Result<Reactive<&'static str>, HandlerError> {
        Ok(Reactive::constant("pong"))
    }
}

/// Counts ticks since the subscription started.
///
/// The ticker task stops when the invocation scope closes.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    interval: Duration,
}

impl Clock {
    /// Creates a clock ticking every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_INTERVAL)
    }
}

impl SubscriptionHandler for Clock {
    type Request = ();
    type Response = u64;

    async fn subscribe(
        &self,
        (): (),
        context: &InvocationContext,
    ) -> Result<Reactive<u64>, HandlerError> {
        let ticks = Signal::new(0_u64);
        let reactive = ticks.reactive();
        let stop = context.scope().token().clone();
        let period = self.interval;
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = interval.tick() => {
                        if ticks.update(|count| *count += 1).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(reactive)
    }
}

/// Echoes its request chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl SubscriptionHandler for Echo {
    type Request = (Value,);
    type Response = Value;

    async fn subscribe(
        &self,
        (value,): (Value,),
        _context: &InvocationContext,
    ) -> Result<Reactive<Value>, HandlerError> {
        Ok(Reactive::constant(value))
    }
}

/// Read side of the shared counter.
#[derive(Debug, Clone)]
pub struct Counter {
    total: Signal<i64>,
}

/// Write side of the shared counter.
#[derive(Debug, Clone)]
pub struct CounterAdd {
    total: Signal<i64>,
}

/// Creates both halves of a counter starting at zero.
#[must_use]
pub fn counter() -> (Counter, CounterAdd) {
    let total = Signal::new(0);
    (
        Counter {
            total: total.clone(),
        },
        CounterAdd { total },
    )
}

impl SubscriptionHandler for Counter {
    type Request = ();
    type Response = i64;

    async fn subscribe(
        &self,
        (): (),
        _context: &InvocationContext,
    ) -> Result<Reactive<i64>, HandlerError> {
        Ok(self.total.reactive())
    }
}

impl MutationHandler for CounterAdd {
    type Request = (i64,);
    type Response = i64;

    async fn mutate(
        &self,
        (delta,): (i64,),
        _context: &InvocationContext,
    ) -> Result<i64, HandlerError> {
        let mut overflowed = false;
        let total = self.total.try_update(|total| match total.checked_add(delta) {
            Some(next) => {
                *total = next;
                true
            }
            None => {
                overflowed = true;
                false
            }
        })?;
        if overflowed {
            return Err(HandlerError::new(format!(
                "adding {delta} to {total} overflows"
            )));
        }
        Ok(total)
    }
}

/// Adds the diagnostic handlers to `builder`, with the clock ticking every
/// `clock_interval`.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if `builder` already holds one of
/// the diagnostic names.
pub fn register(
    builder: RegistryBuilder,
    clock_interval: Duration,
) -> Result<RegistryBuilder, RegistryError> {
    let (counter, add) = counter();
    builder
        .subscription("ping", Ping)?
        .subscription("clock", Clock::new(clock_interval))?
        .subscription("echo", Echo)?
        .subscription("counter", counter)?
        .mutation("counter.add", add)
}

/// Registry holding only the diagnostic handlers.
///
/// # Errors
///
/// Never fails in practice; the names are distinct.
pub fn registry() -> Result<Registry, RegistryError> {
    Ok(register(Registry::builder(), DEFAULT_CLOCK_INTERVAL)?.build())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::context::{RawRequest, Scope};
    use crate::protocol::{Action, PullSequence};

    fn mutation_context() -> InvocationContext {
        InvocationContext::new(
            "m1",
            "counter.add",
            Action::Mutate,
            RawRequest::Frame(Bytes::new()),
            PullSequence::from_bytes(Bytes::new()),
            Scope::new(),
        )
    }

    #[tokio::test]
    async fn additions_notify_counter_subscribers() {
        let (counter, add) = counter();
        let mut observer = counter.total.reactive();

        let total = add
            .mutate((4,), &mutation_context())
            .await
            .expect("add");
        assert_eq!(total, 4);
        assert!(observer.changed().await);
        assert_eq!(observer.current(), Ok(4));
    }

    #[tokio::test]
    async fn overflowing_additions_leave_subscribers_undisturbed() {
        let (counter, add) = counter();
        add.mutate((i64::MAX,), &mutation_context())
            .await
            .expect("first add");
        let mut observer = counter.total.reactive();

        let error = add
            .mutate((1,), &mutation_context())
            .await
            .expect_err("overflow");
        assert!(error.message().contains("overflows"));

        let woke = tokio::time::timeout(Duration::from_millis(20), observer.changed()).await;
        assert!(woke.is_err(), "subscribers saw an unchanged total");
        assert_eq!(observer.current(), Ok(i64::MAX));
    }
}
