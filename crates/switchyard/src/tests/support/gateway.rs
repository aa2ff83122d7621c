//! BDD test world driving one WebSocket connection through the dispatcher
//! without a socket.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ciborium::Value;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;

use switchyard_config::DEFAULT_MAX_FRAME_BYTES;

use crate::builtin;
use crate::dispatch::HandlerRouter;
use crate::protocol::Action;
use crate::registry::Registry;
use crate::session::{ConnectionId, ConnectionState, PeerSender};
use crate::transport::WebSocketDispatcher;

use super::frames::{DecodedFrame, drain_frames, encode_frame, next_frame};
use super::reporter::RecordingHealthReporter;

/// Clock interval used by dispatch scenarios.
const SCENARIO_CLOCK_INTERVAL: Duration = Duration::from_millis(10);

/// Scenario world holding one open connection.
pub struct GatewayWorld {
    runtime: Runtime,
    dispatcher: Arc<WebSocketDispatcher>,
    pub reporter: Arc<RecordingHealthReporter>,
    connection: ConnectionId,
    frames: mpsc::Receiver<Bytes>,
    received: Vec<DecodedFrame>,
    cleanups: Option<usize>,
}

impl GatewayWorld {
    /// Opens a connection against the built-in handlers.
    #[must_use]
    pub fn new() -> Self {
        let registry = builtin::register(Registry::builder(), SCENARIO_CLOCK_INTERVAL)
            .expect("built-in handlers")
            .build();
        let reporter = Arc::new(RecordingHealthReporter::default());
        let dispatcher = Arc::new(WebSocketDispatcher::new(
            HandlerRouter::new(registry),
            reporter.clone(),
            DEFAULT_MAX_FRAME_BYTES,
        ));
        let (peer, frames) = PeerSender::channel(64);
        let connection = dispatcher.open(peer);
        Self {
            runtime: Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("test runtime"),
            dispatcher,
            reporter,
            connection,
            frames,
            received: Vec::new(),
            cleanups: None,
        }
    }

    /// Sends one client frame and waits for its transition to apply.
    pub fn send(&mut self, action: Action, id: &str, handler: Option<&str>, chunks: &[Value]) {
        let bytes = encode_frame(action, id, handler, chunks);
        self.runtime.block_on(async {
            self.dispatcher
                .message(self.connection, bytes)
                .await
                .wait()
                .await;
        });
    }

    /// Waits for `count` more frames.
    pub fn receive(&mut self, count: usize) {
        for _ in 0..count {
            let frame = self.runtime.block_on(next_frame(&mut self.frames));
            self.received.push(frame);
        }
    }

    /// Collects frames until the connection goes quiet.
    pub fn drain(&mut self) -> usize {
        let frames = self
            .runtime
            .block_on(drain_frames(&mut self.frames, Duration::from_millis(50)));
        let drained = frames.len();
        self.received.extend(frames);
        drained
    }

    /// Waits until exactly `expected` push loops are running.
    pub fn settle(&self, expected: usize) -> bool {
        let state = self.state();
        self.runtime.block_on(async {
            for _ in 0..200 {
                if state.running_push_loops() == expected {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            false
        })
    }

    /// Lets `duration` of wall time pass with every task running.
    pub fn idle(&self, duration: Duration) {
        self.runtime
            .block_on(async move { tokio::time::sleep(duration).await });
    }

    /// Number of frames waiting in the outbound queue.
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// Installed subscriptions on the connection.
    pub fn subscriptions(&self) -> usize {
        let state = self.state();
        self.runtime.block_on(state.len())
    }

    /// Running push loops on the connection.
    pub fn push_loops(&self) -> usize {
        self.state().running_push_loops()
    }

    /// Frames received so far, oldest first.
    pub fn received(&self) -> &[DecodedFrame] {
        &self.received
    }

    /// Closes the connection and records the cleanups scheduled.
    pub fn close(&mut self) {
        let cleanups = self
            .runtime
            .block_on(self.dispatcher.close(self.connection));
        self.cleanups = Some(cleanups);
    }

    /// Cleanups scheduled by [`Self::close`].
    pub const fn cleanups(&self) -> Option<usize> {
        self.cleanups
    }

    /// Connection identifier.
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    fn state(&self) -> Arc<ConnectionState> {
        self.dispatcher
            .connection(self.connection)
            .expect("connection open")
    }
}

impl Default for GatewayWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default gateway world fixture.
#[must_use]
pub fn gateway_world() -> RefCell<GatewayWorld> {
    RefCell::new(GatewayWorld::new())
}
