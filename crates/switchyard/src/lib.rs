//! Switchyard: a streaming RPC gateway.
//!
//! Handlers are registered by name as either subscriptions or mutations and
//! exposed over one listener. A WebSocket at `/ws` carries binary frames for
//! every action and keeps subscriptions open, pushing a `server:update`
//! frame whenever a handler's reactive value changes. `POST /rpc` runs a
//! single `client:once` or `client:mutate` frame and answers with the
//! encoded result.
//!
//! Frames are runs of CBOR items. The first is the [`protocol::Header`];
//! the rest are request chunks decoded lazily, in order, through a
//! [`protocol::PullSequence`] as the handler's [`shape::RequestShape`]
//! asks for them.
//!
//! The bootstrap sequence loads configuration through [`ConfigLoader`],
//! installs structured telemetry, then binds the listener. Each stage
//! reports to a [`HealthReporter`].

mod bootstrap;
pub mod builtin;
pub mod context;
pub mod dispatch;
mod health;
pub mod protocol;
pub mod reactive;
pub mod registry;
pub mod session;
pub mod shape;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, RunningGateway, StaticConfigLoader, Switchyard,
    SystemConfigLoader, bootstrap_with, run,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
