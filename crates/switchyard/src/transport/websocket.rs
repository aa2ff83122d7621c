//! WebSocket message dispatcher.
//!
//! Each binary message is one frame. Subscribe and unsubscribe frames are
//! queued per subscription id, so transitions for one id apply in receive
//! order while other ids, and the socket reader, carry on. Once and mutate
//! frames run on their own tasks and answer with a single `server:update`
//! frame flagged `complete`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, trace};

use crate::context::{RawRequest, Scope};
use crate::dispatch::{
    GatewayError, HandlerRouter, InboundFrame, complete_frame, error_frame, log_failure,
};
use crate::health::HealthReporter;
use crate::protocol::{Action, DecodeError, PullSequence};
use crate::session::{Applied, ConnectionId, ConnectionState, PeerSender, Transition};

use super::TRANSPORT_TARGET;

/// Tracks open WebSocket connections and routes their messages.
pub struct WebSocketDispatcher {
    router: HandlerRouter,
    reporter: Arc<dyn HealthReporter>,
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionState>>>,
    next_id: AtomicU64,
    max_frame_bytes: usize,
}

impl std::fmt::Debug for WebSocketDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketDispatcher")
            .field("open_connections", &self.open_connections())
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish_non_exhaustive()
    }
}

impl WebSocketDispatcher {
    /// Creates a dispatcher with no open connections.
    pub fn new(
        router: HandlerRouter,
        reporter: Arc<dyn HealthReporter>,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            router,
            reporter,
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_frame_bytes,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<ConnectionState>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates empty connection state for a new peer.
    pub fn open(&self, peer: PeerSender) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = ConnectionState::new(id, peer, self.router.clone());
        self.table().insert(id, state);
        self.reporter.connection_opened(id);
        id
    }

    /// State of an open connection.
    #[must_use]
    pub fn connection(&self, connection: ConnectionId) -> Option<Arc<ConnectionState>> {
        self.table().get(&connection).cloned()
    }

    /// Number of open connections.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.table().len()
    }

    /// Handles one binary message.
    ///
    /// Returns once the frame is decoded and its work queued; the returned
    /// [`Applied`] resolves when that work has finished. Messages for unknown
    /// connections are dropped.
    pub async fn message(&self, connection: ConnectionId, bytes: Bytes) -> Applied {
        let Some(state) = self.connection(connection) else {
            debug!(target: TRANSPORT_TARGET, connection, "message for closed connection");
            return Applied::ready();
        };
        let pull = PullSequence::from_bytes(bytes.clone()).with_chunk_limit(self.max_frame_bytes);
        let frame = match InboundFrame::read(pull).await {
            Ok(frame) => frame,
            Err(error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection,
                    kind = error.kind(),
                    error = %error,
                    "undecodable frame"
                );
                deliver_error(&state, "", &error).await;
                return Applied::ready();
            }
        };

        let id = frame.header().id().to_owned();
        let action = frame.header().action();
        trace!(target: TRANSPORT_TARGET, connection, id, action = %action, "frame received");

        match action {
            Action::Subscribe => {
                let lane = Arc::clone(&state);
                state.in_order(&id, subscribe(lane, frame, bytes))
            }
            Action::Unsubscribe => {
                let lane = Arc::clone(&state);
                state.in_order(&id, unsubscribe(lane, id.clone()))
            }
            Action::Once | Action::Mutate => Applied::spawn(one_shot(state, frame, bytes)),
            Action::Update => {
                let error = GatewayError::unsupported_action(action);
                log_failure(action, &id, frame.header().handler(), &error);
                deliver_error(&state, &id, &error).await;
                Applied::ready()
            }
        }
    }

    /// Answers a message the transport could not treat as a frame.
    pub async fn reject(&self, connection: ConnectionId, reason: &str) {
        if let Some(state) = self.connection(connection) {
            let error = GatewayError::Decode(DecodeError::malformed(reason));
            deliver_error(&state, "", &error).await;
        }
    }

    /// Closes a connection and schedules cleanup for all its subscriptions.
    ///
    /// Returns the number of cleanups scheduled; `0` for unknown connections.
    pub async fn close(&self, connection: ConnectionId) -> usize {
        let Some(state) = self.table().remove(&connection) else {
            return 0;
        };
        let cleanups = state.close().await;
        self.reporter.connection_closed(connection, cleanups);
        cleanups
    }

    /// Closes every open connection.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.table().keys().copied().collect();
        let mut cleanups = 0;
        for id in ids {
            cleanups += self.close(id).await;
        }
        cleanups
    }
}

async fn subscribe(state: Arc<ConnectionState>, frame: InboundFrame, bytes: Bytes) {
    let id = frame.header().id().to_owned();
    let handler = frame.header().handler().map(str::to_owned);
    match state.subscribe(frame, bytes).await {
        Ok(transition) => {
            debug!(
                target: TRANSPORT_TARGET,
                connection = state.id(),
                id,
                transition = %transition,
                "subscribe applied"
            );
        }
        Err(GatewayError::Cancelled) if state.token().is_cancelled() => {}
        Err(error) => {
            log_failure(Action::Subscribe, &id, handler.as_deref(), &error);
            deliver_error(&state, &id, &error).await;
        }
    }
}

async fn unsubscribe(state: Arc<ConnectionState>, id: String) {
    if state.unsubscribe(&id).await == Transition::Ignored {
        trace!(
            target: TRANSPORT_TARGET,
            connection = state.id(),
            id,
            "unsubscribe for unknown id"
        );
    }
}

async fn one_shot(state: Arc<ConnectionState>, frame: InboundFrame, bytes: Bytes) {
    let id = frame.header().id().to_owned();
    let action = frame.header().action();
    let handler = frame.handler().map(str::to_owned).ok();
    let scope = Scope::child_of(state.token());
    let outcome = match frame.into_context(RawRequest::Frame(bytes), scope) {
        Ok(context) => state.router().run_once(context).await,
        Err(error) => Err(error),
    };
    let reply = outcome
        .and_then(|value| complete_frame(&id, handler.as_deref().unwrap_or_default(), &value));
    match reply {
        Ok(frame) => deliver(&state, frame).await,
        Err(GatewayError::Cancelled) if state.token().is_cancelled() => {}
        Err(error) => {
            log_failure(action, &id, handler.as_deref(), &error);
            deliver_error(&state, &id, &error).await;
        }
    }
}

async fn deliver(state: &ConnectionState, frame: Bytes) {
    tokio::select! {
        biased;
        () = state.token().cancelled() => {}
        _ = state.peer().send(frame) => {}
    }
}

async fn deliver_error(state: &ConnectionState, id: &str, error: &GatewayError) {
    if let Some(frame) = error_frame(id, error) {
        deliver(state, frame).await;
    }
}

/// Drives one upgraded socket until either side closes it.
pub(super) async fn serve_socket(
    dispatcher: Arc<WebSocketDispatcher>,
    socket: WebSocket,
    outbound_capacity: usize,
) {
    let (mut sink, mut stream) = socket.split();
    let (peer, mut outbound) = PeerSender::channel(outbound_capacity);
    let connection = dispatcher.open(peer);
    let Some(closed) = dispatcher
        .connection(connection)
        .map(|state| state.token().clone())
    else {
        return;
    };

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
    });

    loop {
        let message = tokio::select! {
            () = closed.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Binary(bytes))) => {
                // Queued work completes in the background.
                drop(dispatcher.message(connection, bytes).await);
            }
            Some(Ok(Message::Text(_))) => {
                dispatcher
                    .reject(connection, "text messages are not supported")
                    .await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection,
                    error = %error,
                    "socket read failed"
                );
                break;
            }
        }
    }

    dispatcher.close(connection).await;
    writer.abort();
}
