//! Test double for [`HealthReporter`] that records structured events for
//! assertions.

use std::net::SocketAddr;
use std::sync::Mutex;

use switchyard_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::session::ConnectionId;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// The listener is accepting connections.
    ListenerReady(SocketAddr),
    /// A WebSocket connection opened.
    ConnectionOpened(ConnectionId),
    /// A WebSocket connection closed after scheduling `cleanups`.
    ConnectionClosed {
        connection: ConnectionId,
        cleanups: usize,
    },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_ready(&self, address: SocketAddr) {
        self.record(HealthEvent::ListenerReady(address));
    }

    fn connection_opened(&self, connection: ConnectionId) {
        self.record(HealthEvent::ConnectionOpened(connection));
    }

    fn connection_closed(&self, connection: ConnectionId, cleanups: usize) {
        self.record(HealthEvent::ConnectionClosed {
            connection,
            cleanups,
        });
    }
}
