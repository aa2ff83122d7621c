//! Layered configuration for the Switchyard gateway.
//!
//! Values are resolved with `ortho_config` in increasing order of
//! precedence: built-in defaults, a TOML file named by `--config-path` or
//! `SWITCHYARD_CONFIG_PATH`, `SWITCHYARD_*` environment variables, and
//! finally command-line flags.
//!
//! ```toml
//! listen = "tcp://0.0.0.0:9780"
//! log_filter = "switchyard=debug,info"
//! log_format = "compact"
//! max_frame_bytes = 262144
//! ```

mod defaults;
mod listen;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_OUTBOUND_CAPACITY, default_listen_endpoint, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use listen::{ListenEndpoint, ListenParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SWITCHYARD")]
pub struct Config {
    /// Endpoint serving `/ws`, `/rpc` and `/healthz`.
    #[ortho_config(default = default_listen_endpoint())]
    pub listen: ListenEndpoint,
    /// `tracing_subscriber::EnvFilter` expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log event encoding.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Upper bound on one inbound frame, in bytes.
    #[ortho_config(default = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// Bounded capacity of each connection's outbound frame queue.
    #[ortho_config(default = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl Config {
    /// Endpoint the gateway binds to.
    #[must_use]
    pub fn listen(&self) -> &ListenEndpoint {
        &self.listen
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log event encoding.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Upper bound on one inbound frame, never below one kibibyte.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes.max(1024)
    }

    /// Outbound queue capacity, never zero.
    #[must_use]
    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity.max(1)
    }
}
