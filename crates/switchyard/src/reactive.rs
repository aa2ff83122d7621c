//! Observable values produced by subscription handlers.
//!
//! A [`Signal`] is the writable source and a [`Reactive`] is the read side a
//! handler returns. The push loop turns a `Reactive` into a stream that
//! yields the current value first and then one item per change. Both sides
//! are thin wrappers over [`tokio::sync::watch`], so intermediate values may
//! be coalesced when a producer outpaces the consumer.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Failure reported by a handler computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

type Slot<T> = Result<T, HandlerError>;

/// Writable source of a reactive value.
pub struct Signal<T> {
    sender: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("observers", &self.sender.receiver_count())
            .finish()
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a signal holding `initial`.
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(Ok(initial));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Replaces the value and notifies observers.
    pub fn set(&self, value: T) {
        self.sender.send_replace(Ok(value));
    }

    /// Modifies the value in place and returns the result.
    ///
    /// # Errors
    ///
    /// Returns the stored [`HandlerError`] if the signal has failed; the
    /// closure is not run in that case.
    pub fn update(&self, apply: impl FnOnce(&mut T)) -> Result<T, HandlerError> {
        self.try_update(|value| {
            apply(value);
            true
        })
    }

    /// Like [`Signal::update`], but observers are notified only when `apply`
    /// returns `true`.
    ///
    /// # Errors
    ///
    /// Returns the stored [`HandlerError`] if the signal has failed.
    pub fn try_update(&self, apply: impl FnOnce(&mut T) -> bool) -> Result<T, HandlerError> {
        let mut outcome = None;
        self.sender.send_if_modified(|slot| match slot {
            Ok(value) => {
                let modified = apply(value);
                outcome = Some(Ok(value.clone()));
                modified
            }
            Err(error) => {
                outcome = Some(Err(error.clone()));
                false
            }
        });
        outcome.unwrap_or_else(|| Err(HandlerError::new("signal update was not applied")))
    }

    /// Puts the signal into a failed state; observers receive the error.
    pub fn fail(&self, error: HandlerError) {
        self.sender.send_replace(Err(error));
    }

    /// Current value.
    ///
    /// # Errors
    ///
    /// Returns the stored [`HandlerError`] if the signal has failed.
    pub fn get(&self) -> Result<T, HandlerError> {
        self.sender.borrow().clone()
    }

    /// A new observer positioned at the current value.
    #[must_use]
    pub fn reactive(&self) -> Reactive<T> {
        Reactive {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Read side of a reactive value.
pub struct Reactive<T> {
    receiver: watch::Receiver<Slot<T>>,
}

impl<T> std::fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactive").finish_non_exhaustive()
    }
}

impl<T> Reactive<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A value that never changes.
    pub fn constant(value: T) -> Self {
        let (_, receiver) = watch::channel(Ok(value));
        Self { receiver }
    }

    /// A value that has already failed.
    pub fn failed(error: HandlerError) -> Self {
        let (_, receiver) = watch::channel(Err(error));
        Self { receiver }
    }

    /// Current value.
    ///
    /// # Errors
    ///
    /// Returns the source's [`HandlerError`] if it has failed.
    pub fn current(&self) -> Result<T, HandlerError> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next change; `false` once the source is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Derives a value that tracks this one through `transform`.
    ///
    /// The forwarding task ends when either side is dropped. Must be called
    /// from within a Tokio runtime.
    pub fn map<U, F>(mut self, transform: F) -> Reactive<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + 'static,
    {
        let apply = move |slot: &Slot<T>| slot.as_ref().map(&transform).map_err(Clone::clone);
        let (sender, receiver) = watch::channel(apply(&self.receiver.borrow_and_update()));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = sender.closed() => break,
                    changed = self.receiver.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let next = apply(&self.receiver.borrow_and_update());
                        sender.send_replace(next);
                    }
                }
            }
        });
        Reactive { receiver }
    }

    /// Current value followed by one item per change.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Result<T, HandlerError>> {
        WatchStream::new(self.receiver).boxed()
    }
}
