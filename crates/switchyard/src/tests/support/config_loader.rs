//! Test configuration loaders for scenarios covering success and failure
//! paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use switchyard_config::{Config, ListenEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader binding an ephemeral loopback port.
#[derive(Debug, Default)]
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            listen: ListenEndpoint::tcp("127.0.0.1", 0),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an invalid listen flag.
#[derive(Debug, Default)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("switchyard"),
            OsString::from("--listen"),
            OsString::from("unix:///tmp/switchyard.sock"),
        ];
        Config::load_from_iter(args)
    }
}
