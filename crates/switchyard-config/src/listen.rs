use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// TCP endpoint the gateway listens on for WebSocket and HTTP traffic.
///
/// Endpoints are written as `tcp://HOST:PORT` in configuration files,
/// environment variables and command-line flags alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenEndpoint {
    host: String,
    port: u16,
}

impl ListenEndpoint {
    /// Builds an endpoint from a host name (or address literal) and a port.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address literal.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port; `0` asks the operating system for an ephemeral port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tcp://{}:{}", self.host, self.port)
    }
}

impl FromStr for ListenEndpoint {
    type Err = ListenParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        if url.scheme() != "tcp" {
            return Err(ListenParseError::UnsupportedScheme(url.scheme().to_owned()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ListenParseError::MissingHost(input.to_owned()))?;
        let port = url
            .port()
            .ok_or_else(|| ListenParseError::MissingPort(input.to_owned()))?;
        // Bracketed IPv6 literals keep their brackets in `host_str`.
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::tcp(host, port))
    }
}

impl TryFrom<String> for ListenEndpoint {
    type Error = ListenParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenEndpoint> for String {
    fn from(endpoint: ListenEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing a [`ListenEndpoint`] from text.
#[derive(Debug, Error)]
pub enum ListenParseError {
    /// Only `tcp://` endpoints are served.
    #[error("unsupported listen scheme '{0}'")]
    UnsupportedScheme(String),
    /// The endpoint did not name a host.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// The endpoint did not name a port.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// The text is not a URL at all.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn displays_as_tcp_url() {
        let endpoint = ListenEndpoint::tcp("127.0.0.1", 9780);
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:9780");
    }

    #[test]
    fn parses_tcp_endpoint() {
        let endpoint: ListenEndpoint = "tcp://0.0.0.0:8080".parse().expect("parse endpoint");
        assert_eq!(endpoint.host(), "0.0.0.0");
        assert_eq!(endpoint.port(), 8080);
    }

    #[test]
    fn strips_ipv6_brackets() {
        let endpoint: ListenEndpoint = "tcp://[::1]:9000".parse().expect("parse endpoint");
        assert_eq!(endpoint.host(), "::1");
    }

    #[rstest]
    #[case::unix("unix:///tmp/switchyard.sock")]
    #[case::http("http://localhost:80")]
    fn rejects_other_schemes(#[case] input: &str) {
        let error = input.parse::<ListenEndpoint>().expect_err("scheme rejected");
        assert!(matches!(error, ListenParseError::UnsupportedScheme(_)));
    }

    #[test]
    fn rejects_missing_port() {
        let error = "tcp://localhost"
            .parse::<ListenEndpoint>()
            .expect_err("port required");
        assert!(matches!(error, ListenParseError::MissingPort(_)));
    }

    #[test]
    fn round_trips_through_string_form() {
        let endpoint = ListenEndpoint::tcp("localhost", 1234);
        let text = String::from(endpoint.clone());
        assert_eq!(ListenEndpoint::try_from(text).expect("reparse"), endpoint);
    }
}
