use crate::listen::ListenEndpoint;
use crate::logging::LogFormat;

/// Host the gateway binds to when none is configured.
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Port the gateway binds to when none is configured.
pub const DEFAULT_LISTEN_PORT: u16 = 9780;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest accepted WebSocket message, and largest single buffered chunk of
/// a streamed HTTP body.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Frames queued per connection before push loops wait for the peer.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default listen endpoint.
#[must_use]
pub fn default_listen_endpoint() -> ListenEndpoint {
    ListenEndpoint::tcp(DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT)
}
