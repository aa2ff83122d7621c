//! Test suites for the gateway bootstrap and WebSocket dispatch.

pub(crate) mod support;
