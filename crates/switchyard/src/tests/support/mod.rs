//! Test harness utilities shared by the behavioural and dispatcher suites.

mod config_loader;
pub mod frames;
mod gateway;
mod handlers;
mod reporter;
mod world;

pub use gateway::{GatewayWorld, gateway_world};
pub use handlers::Gate;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{TestWorld, world};
