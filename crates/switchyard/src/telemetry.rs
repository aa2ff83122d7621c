//! Process-wide `tracing` subscriber for the gateway.
//!
//! Events go to stderr with RFC 3339 UTC timestamps and their target, so
//! `switchyard::session` and `switchyard::transport` lines can be filtered
//! apart. Colour is used only when stderr is a terminal.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Subscriber, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;

use switchyard_config::{Config, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Records which format the process-wide subscriber uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the first successful initialisation.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid `EnvFilter` expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Some other subscriber already owns the global default.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the subscriber described by `config` unless one is already
/// installed by this module.
///
/// Only the first call touches global state. Later calls, even with a
/// different configuration, return a handle naming the format that is
/// actually in effect.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when a foreign subscriber got there first.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let format = INSTALLED.get_or_try_init(|| {
        let filter = parse_filter(config.log_filter())?;
        tracing::subscriber::set_global_default(build(filter, config.log_format()))
            .map_err(TelemetryError::Subscriber)?;
        info!(
            target: concat!(env!("CARGO_PKG_NAME"), "::telemetry"),
            format = %config.log_format(),
            "telemetry installed"
        );
        Ok::<_, TelemetryError>(config.log_format())
    })?;
    Ok(TelemetryHandle { format: *format })
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn build(filter: EnvFilter, format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}
