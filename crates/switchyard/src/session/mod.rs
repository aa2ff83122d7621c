//! Per-connection subscription state.
//!
//! A [`ConnectionState`] maps subscription ids to their live invocation
//! context and push loop. Handlers are started without holding any lock;
//! only the final lookup and swap runs under the connection's map mutex, as
//! a single read-modify-write. Two subscribes for the same id therefore never
//! both install a push loop: the later swap always observes and replaces the
//! earlier one. Work that must apply in receive order per id goes through
//! [`ConnectionState::in_order`].
//!
//! ```text
//!             subscribe                 subscribe (valid)
//!   Absent ─────────────▶ Active ◀───────────────────────┐
//!     ▲                     │ │                           │
//!     │   unsubscribe,      │ └───────────────────────────┘
//!     │   close, or         │      context replaced in place,
//!     └── handler failure ──┘      push loop kept
//! ```
//!
//! Teardown never waits on the transport: cleanup cancels the push loop,
//! closes its context, and reaps the task in the background.

mod lane;
mod peer;
mod push;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use strum::Display;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use self::lane::Applied;
use self::lane::Lanes;
pub use self::peer::PeerSender;
use self::push::{Binding, PushHandle, PushLoop, newest_binding};

use crate::context::{ContextSlot, InvocationContext, RawRequest, Scope};
use crate::dispatch::{GatewayError, HandlerRouter, InboundFrame};

/// Tracing target for subscription lifecycle events.
pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Identifier assigned to each open connection.
pub type ConnectionId = u64;

/// Outcome of a state-machine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    /// A new subscription and push loop were created.
    Installed,
    /// An existing subscription's context was replaced in place.
    Replaced,
    /// A subscription was removed and its cleanup scheduled.
    Removed,
    /// Nothing changed.
    Ignored,
}

struct SubscriptionState {
    slot: ContextSlot,
    rebind: mpsc::UnboundedSender<Binding>,
    push: PushHandle,
    generation: u64,
}

impl SubscriptionState {
    /// Stops the push loop and closes the context without waiting for either.
    fn schedule_cleanup(self, id: &str) {
        let Self { slot, push, .. } = self;
        push.stop.cancel();
        slot.close();
        let id = id.to_owned();
        tokio::spawn(async move {
            if let Err(error) = push.task.await
                && error.is_panic()
            {
                warn!(target: SESSION_TARGET, id, "push loop panicked");
            }
        });
    }
}

/// Counts live push loops; decremented when the guard drops.
struct LoopGuard(Arc<AtomicUsize>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Subscriptions and outbound queue of one connection.
pub struct ConnectionState {
    id: ConnectionId,
    peer: PeerSender,
    router: HandlerRouter,
    token: CancellationToken,
    subscriptions: Mutex<HashMap<String, SubscriptionState>>,
    lanes: Lanes,
    generations: AtomicU64,
    running: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("id", &self.id)
            .field("closed", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ConnectionState {
    /// Creates the empty state for a newly opened connection.
    #[must_use]
    pub fn new(id: ConnectionId, peer: PeerSender, router: HandlerRouter) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer,
            router,
            token: CancellationToken::new(),
            subscriptions: Mutex::new(HashMap::new()),
            lanes: Lanes::default(),
            generations: AtomicU64::new(0),
            running: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Outbound frame queue.
    #[must_use]
    pub const fn peer(&self) -> &PeerSender {
        &self.peer
    }

    /// Router resolving this connection's invocations.
    #[must_use]
    pub const fn router(&self) -> &HandlerRouter {
        &self.router
    }

    /// Token cancelled when the connection closes; parent of every
    /// invocation scope opened on it.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of subscriptions currently held.
    pub async fn len(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Returns `true` when no subscriptions are held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Context currently installed for `id`.
    pub async fn context(&self, id: &str) -> Option<Arc<InvocationContext>> {
        self.subscriptions
            .lock()
            .await
            .get(id)
            .and_then(|state| state.slot.current())
    }

    /// Number of push loops still running.
    #[must_use]
    pub fn running_push_loops(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs `work` after everything previously submitted for `id` on this
    /// connection. Work for other ids is not held up.
    pub fn in_order(
        &self,
        id: &str,
        work: impl Future<Output = ()> + Send + 'static,
    ) -> Applied {
        self.lanes.submit(id, work)
    }

    fn push_loop_started(&self) -> LoopGuard {
        self.running.fetch_add(1, Ordering::SeqCst);
        LoopGuard(Arc::clone(&self.running))
    }

    /// Applies a `client:subscribe` frame.
    ///
    /// The new request is validated and the handler started before any state
    /// changes, with no lock held. On success an absent id gets a new push
    /// loop and an active id has its context replaced in place and its loop
    /// rebound to the new computation; the displaced context is closed after
    /// the new one is visible. On failure the new context is closed and any
    /// existing subscription is left untouched.
    ///
    /// Concurrent calls for the same id resolve in the order their swaps take
    /// the lock, not the order they were made.
    ///
    /// # Errors
    ///
    /// Returns the [`GatewayError`] raised while resolving, validating, or
    /// starting the handler, or [`GatewayError::Cancelled`] once the
    /// connection has closed.
    pub async fn subscribe(
        self: &Arc<Self>,
        frame: InboundFrame,
        raw: Bytes,
    ) -> Result<Transition, GatewayError> {
        if self.token.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let id = frame.header().id().to_owned();
        let scope = Scope::child_of(&self.token);
        let context = Arc::new(frame.into_context(RawRequest::Frame(raw), scope)?);
        let updates = match self.router.start_subscription(&context).await {
            Ok(updates) => updates,
            Err(error) => {
                context.close();
                return Err(error);
            }
        };
        let binding = Binding {
            handler: context.handler().to_owned(),
            updates,
        };

        let mut subscriptions = self.subscriptions.lock().await;
        if self.token.is_cancelled() {
            drop(subscriptions);
            context.close();
            return Err(GatewayError::Cancelled);
        }
        let binding = match subscriptions.get(&id) {
            Some(state) => match state.rebind.send(binding) {
                Ok(()) => {
                    if let Some(previous) = state.slot.replace(Arc::clone(&context)) {
                        previous.close();
                    }
                    debug!(target: SESSION_TARGET, connection = self.id, id, "subscription replaced");
                    return Ok(Transition::Replaced);
                }
                Err(mpsc::error::SendError(binding)) => {
                    // The loop already exited; start over with a fresh one.
                    if let Some(stale) = subscriptions.remove(&id) {
                        stale.schedule_cleanup(&id);
                    }
                    binding
                }
            },
            None => binding,
        };

        let state = self.spawn_push_loop(id.clone(), context, binding);
        subscriptions.insert(id.clone(), state);
        debug!(target: SESSION_TARGET, connection = self.id, id, "subscription installed");
        Ok(Transition::Installed)
    }

    fn spawn_push_loop(
        self: &Arc<Self>,
        id: String,
        context: Arc<InvocationContext>,
        binding: Binding,
    ) -> SubscriptionState {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst);
        let (rebind, rebinds) = mpsc::unbounded_channel();
        let stop = self.token.child_token();
        let push_loop = PushLoop {
            id,
            generation,
            binding,
            rebinds,
            stop: stop.clone(),
            connection: Arc::downgrade(self),
        };
        let task = tokio::spawn(push_loop.run());
        SubscriptionState {
            slot: ContextSlot::holding(context),
            rebind,
            push: PushHandle { stop, task },
            generation,
        }
    }

    /// Applies a `client:unsubscribe` frame. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: &str) -> Transition {
        let removed = self.subscriptions.lock().await.remove(id);
        match removed {
            Some(state) => {
                state.schedule_cleanup(id);
                debug!(target: SESSION_TARGET, connection = self.id, id, "subscription removed");
                Transition::Removed
            }
            None => Transition::Ignored,
        }
    }

    /// Settles a push loop whose computation failed.
    ///
    /// Rebinds are only sent while the map lock is held, so a resubscribe
    /// that landed before this call is visible here. In that case the
    /// subscription stays, the failure is dropped, and the newest binding is
    /// returned for the loop to continue with. Otherwise the loop's entry is
    /// removed and `report` runs before the lock is released, so the failure
    /// is queued for the peer ahead of anything a later subscribe for `id`
    /// pushes.
    async fn retire(
        &self,
        id: &str,
        generation: u64,
        rebinds: &mut mpsc::UnboundedReceiver<Binding>,
        report: impl FnOnce(),
    ) -> Option<Binding> {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(next) = newest_binding(rebinds) {
            debug!(
                target: SESSION_TARGET,
                connection = self.id,
                id,
                "failure superseded by resubscribe"
            );
            return Some(next);
        }
        let owned = subscriptions
            .get(id)
            .is_some_and(|state| state.generation == generation);
        if owned && let Some(state) = subscriptions.remove(id) {
            report();
            drop(subscriptions);
            state.schedule_cleanup(id);
            debug!(target: SESSION_TARGET, connection = self.id, id, "subscription retired");
        }
        None
    }

    /// Closes the connection and schedules cleanup for every subscription.
    ///
    /// Returns the number of cleanup tasks scheduled. Later subscribes are
    /// refused.
    pub async fn close(&self) -> usize {
        self.token.cancel();
        let drained: Vec<(String, SubscriptionState)> =
            self.subscriptions.lock().await.drain().collect();
        let scheduled = drained.len();
        for (id, state) in drained {
            state.schedule_cleanup(&id);
        }
        scheduled
    }
}

#[cfg(test)]
mod tests;
