//! Structured health reporting for gateway lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use switchyard_config::Config;

use crate::bootstrap::BootstrapError;
use crate::session::ConnectionId;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections.
    fn listener_ready(&self, address: SocketAddr);

    /// Invoked when a WebSocket connection opens.
    fn connection_opened(&self, connection: ConnectionId);

    /// Invoked when a WebSocket connection closes, with the number of
    /// subscription cleanups scheduled for it.
    fn connection_closed(&self, connection: ConnectionId, cleanups: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_ready(&self, address: SocketAddr) {
        (**self).listener_ready(address);
    }

    fn connection_opened(&self, connection: ConnectionId) {
        (**self).connection_opened(connection);
    }

    fn connection_closed(&self, connection: ConnectionId, cleanups: usize) {
        (**self).connection_closed(connection, cleanups);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting gateway bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = %config.listen(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            max_frame_bytes = config.max_frame_bytes(),
            "gateway bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "gateway bootstrap failed"
        );
    }

    fn listener_ready(&self, address: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            address = %address,
            "gateway accepting connections"
        );
    }

    fn connection_opened(&self, connection: ConnectionId) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "connection_opened",
            connection,
            "connection opened"
        );
    }

    fn connection_closed(&self, connection: ConnectionId, cleanups: usize) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "connection_closed",
            connection,
            cleanups,
            "connection closed"
        );
    }
}
