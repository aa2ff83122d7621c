//! Per-subscription push loop.
//!
//! The loop owns the subscription's current update stream and writes one
//! `server:update` frame per value. A resubscribe hands it a replacement
//! stream through the rebind queue; the loop drops the old stream and keeps
//! running, so at most one loop ever exists per subscription id.

use std::sync::Weak;

use ciborium::Value;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{ConnectionState, PeerSender, SESSION_TARGET};
use crate::dispatch::{GatewayError, error_frame, log_failure, update_frame};
use crate::protocol::Action;
use crate::registry::UpdateStream;

/// A handler name paired with the stream it produced.
pub(crate) struct Binding {
    pub(crate) handler: String,
    pub(crate) updates: UpdateStream,
}

/// Stop token and task handle for one running loop.
pub(crate) struct PushHandle {
    pub(crate) stop: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) struct PushLoop {
    pub(crate) id: String,
    pub(crate) generation: u64,
    pub(crate) binding: Binding,
    pub(crate) rebinds: mpsc::UnboundedReceiver<Binding>,
    pub(crate) stop: CancellationToken,
    pub(crate) connection: Weak<ConnectionState>,
}

enum Event {
    Stop,
    Rebind(Binding),
    Item(Option<Result<Value, GatewayError>>),
}

async fn next_item(
    updates: &mut Option<UpdateStream>,
) -> Option<Result<Value, GatewayError>> {
    match updates {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl PushLoop {
    pub(crate) async fn run(self) {
        let Self {
            id,
            generation,
            binding,
            mut rebinds,
            stop,
            connection,
        } = self;
        let Some(state) = connection.upgrade() else {
            return;
        };
        let peer = state.peer().clone();
        let _running = state.push_loop_started();
        drop(state);

        let mut handler = binding.handler;
        let mut updates = Some(binding.updates);
        loop {
            let event = tokio::select! {
                biased;
                () = stop.cancelled() => Event::Stop,
                rebound = rebinds.recv() => rebound.map_or(Event::Stop, Event::Rebind),
                item = next_item(&mut updates) => Event::Item(item),
            };
            let failure = match event {
                Event::Stop => break,
                Event::Rebind(next) => {
                    let next = newest_binding(&mut rebinds).unwrap_or(next);
                    debug!(
                        target: SESSION_TARGET,
                        id,
                        handler = %next.handler,
                        "push loop rebound"
                    );
                    handler = next.handler;
                    updates = Some(next.updates);
                    continue;
                }
                Event::Item(Some(Ok(value))) => match update_frame(&id, &handler, &value) {
                    Ok(frame) => {
                        let delivered = tokio::select! {
                            biased;
                            () = stop.cancelled() => false,
                            sent = peer.send(frame) => sent,
                        };
                        if !delivered {
                            break;
                        }
                        trace!(target: SESSION_TARGET, id, handler, "update pushed");
                        continue;
                    }
                    Err(error) => error,
                },
                Event::Item(Some(Err(error))) => error,
                Event::Item(None) => {
                    updates = None;
                    continue;
                }
            };
            let failed = Failure {
                id: &id,
                generation,
                handler: &handler,
                error: &failure,
            };
            let Some(next) = failed.settle(&connection, &peer, &stop, &mut rebinds).await else {
                break;
            };
            handler = next.handler;
            updates = Some(next.updates);
        }
        debug!(target: SESSION_TARGET, id, generation, "push loop stopped");
    }
}

/// Newest binding waiting in `rebinds`; older ones are discarded.
pub(crate) fn newest_binding(
    rebinds: &mut mpsc::UnboundedReceiver<Binding>,
) -> Option<Binding> {
    let mut newest = None;
    while let Ok(binding) = rebinds.try_recv() {
        newest = Some(binding);
    }
    newest
}

struct Failure<'a> {
    id: &'a str,
    generation: u64,
    handler: &'a str,
    error: &'a GatewayError,
}

impl Failure<'_> {
    /// Reports the failure and retires the subscription, or hands back the
    /// replacement binding when a resubscribe got there first.
    ///
    /// Room for the error frame is reserved before the map lock is taken, so
    /// a slow peer never stalls other transitions on the connection.
    async fn settle(
        &self,
        connection: &Weak<ConnectionState>,
        peer: &PeerSender,
        stop: &CancellationToken,
        rebinds: &mut mpsc::UnboundedReceiver<Binding>,
    ) -> Option<Binding> {
        let frame = error_frame(self.id, self.error);
        let permit = match frame {
            Some(_) => tokio::select! {
                biased;
                () = stop.cancelled() => return None,
                permit = peer.reserve() => permit,
            },
            None => None,
        };
        let state = connection.upgrade()?;
        let report = || {
            log_failure(Action::Subscribe, self.id, Some(self.handler), self.error);
            if let (Some(permit), Some(frame)) = (permit, frame) {
                permit.send(frame);
            }
        };
        state.retire(self.id, self.generation, rebinds, report).await
    }
}
