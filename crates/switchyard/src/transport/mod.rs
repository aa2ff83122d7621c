//! Transport bindings for the gateway.
//!
//! A single axum [`Router`] exposes the gateway over one TCP listener:
//!
//! - `GET /ws` upgrades to a WebSocket carrying binary frames for every
//!   action.
//! - `POST /rpc` accepts one `client:once` or `client:mutate` frame per
//!   request.
//! - `GET /healthz` answers `ok` while the listener is serving.

mod errors;
mod http;
mod listener;
mod websocket;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use switchyard_config::Config;

use crate::dispatch::HandlerRouter;
use crate::health::HealthReporter;
use crate::protocol::PullSequence;
use crate::registry::Registry;

pub use self::errors::ListenerError;
pub use self::http::{HttpDispatcher, HttpReply};
pub use self::listener::{GatewayListener, ListenerHandle};
pub use self::websocket::WebSocketDispatcher;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Both dispatchers plus the limits the HTTP layer enforces.
#[derive(Debug)]
pub struct Gateway {
    websocket: Arc<WebSocketDispatcher>,
    http: HttpDispatcher,
    max_frame_bytes: usize,
    outbound_capacity: usize,
}

impl Gateway {
    /// Wires dispatchers for `registry` using the limits in `config`.
    pub fn new(registry: Registry, config: &Config, reporter: Arc<dyn HealthReporter>) -> Self {
        let router = HandlerRouter::new(registry);
        let max_frame_bytes = config.max_frame_bytes();
        Self {
            websocket: Arc::new(WebSocketDispatcher::new(
                router.clone(),
                reporter,
                max_frame_bytes,
            )),
            http: HttpDispatcher::new(router),
            max_frame_bytes,
            outbound_capacity: config.outbound_capacity(),
        }
    }

    /// WebSocket dispatcher.
    #[must_use]
    pub fn websocket(&self) -> &WebSocketDispatcher {
        &self.websocket
    }

    /// HTTP dispatcher.
    #[must_use]
    pub const fn http(&self) -> &HttpDispatcher {
        &self.http
    }

    /// Closes every open WebSocket connection; returns the cleanups
    /// scheduled.
    pub async fn close_all(&self) -> usize {
        self.websocket.close_all().await
    }
}

/// Builds the axum router serving `gateway`.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/ws", get(websocket))
        .route("/rpc", post(rpc))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(gateway)
}

async fn websocket(State(gateway): State<Arc<Gateway>>, upgrade: WebSocketUpgrade) -> Response {
    let dispatcher = Arc::clone(&gateway.websocket);
    let capacity = gateway.outbound_capacity;
    upgrade
        .max_message_size(gateway.max_frame_bytes)
        .on_upgrade(move |socket| websocket::serve_socket(dispatcher, socket, capacity))
}

async fn rpc(State(gateway): State<Arc<Gateway>>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let pull = PullSequence::from_stream(body.into_data_stream())
        .with_chunk_limit(gateway.max_frame_bytes);
    let reply = gateway.http.dispatch(parts, pull).await;
    (reply.status, reply.body).into_response()
}
