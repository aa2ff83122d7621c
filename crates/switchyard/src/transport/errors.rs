//! Error types for listener operations.

use std::io;

use thiserror::Error;

/// Errors surfaced while binding or running the gateway listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind TCP listener at {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read listener address: {source}")]
    LocalAddr {
        #[source]
        source: io::Error,
    },
    #[error("listener stopped with an error: {source}")]
    Serve {
        #[source]
        source: io::Error,
    },
    #[error("listener task panicked")]
    TaskPanic,
}
