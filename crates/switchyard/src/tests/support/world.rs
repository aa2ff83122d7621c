//! BDD test world for the bootstrap sequence: loader, reporter and the
//! resulting gateway.

use std::cell::RefCell;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::bootstrap::{BootstrapError, ConfigLoader, RunningGateway, Switchyard, bootstrap_with};
use crate::builtin;

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across bootstrap steps.
pub struct TestWorld {
    runtime: Runtime,
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    switchyard: Option<Switchyard>,
    running: Option<RunningGateway>,
    error: Option<BootstrapError>,
    health: Option<String>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("test runtime"),
            loader: Box::new(TestConfigLoader),
            reporter: Arc::new(RecordingHealthReporter::default()),
            switchyard: None,
            running: None,
            error: None,
            health: None,
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.reset_results();
    }

    /// Installs a loader that succeeds.
    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader);
        self.reset_results();
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.switchyard.is_some() || self.error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(switchyard) => self.switchyard = Some(switchyard),
            Err(error) => self.error = Some(error),
        }
    }

    /// Binds the listener with the built-in handlers.
    pub fn start(&mut self) {
        let Some(switchyard) = self.switchyard.take() else {
            return;
        };
        let registry = builtin::registry().expect("built-in handlers");
        match self.runtime.block_on(switchyard.start(registry)) {
            Ok(running) => self.running = Some(running),
            Err(error) => self.error = Some(error),
        }
    }

    /// Fetches `/healthz` over a raw HTTP/1.1 exchange.
    pub fn probe_health(&mut self) {
        let Some(address) = self.running.as_ref().map(RunningGateway::local_addr) else {
            return;
        };
        let response = self.runtime.block_on(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut stream = tokio::net::TcpStream::connect(address)
                .await
                .expect("connect");
            stream
                .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .expect("write request");
            let mut response = Vec::new();
            stream
                .read_to_end(&mut response)
                .await
                .expect("read response");
            String::from_utf8_lossy(&response).into_owned()
        });
        self.health = Some(response);
    }

    /// Stops the running gateway.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take()
            && let Err(error) = self.runtime.block_on(running.stop())
        {
            self.error = Some(error);
        }
    }

    /// Returns the bootstrap or listener error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&BootstrapError> {
        self.error.as_ref()
    }

    /// Returns true when bootstrap produced a gateway.
    #[must_use]
    pub const fn bootstrapped(&self) -> bool {
        self.switchyard.is_some() || self.running.is_some()
    }

    /// Returns true while the listener is serving.
    #[must_use]
    pub const fn serving(&self) -> bool {
        self.running.is_some()
    }

    /// Raw `/healthz` response, if probed.
    #[must_use]
    pub fn health(&self) -> Option<&str> {
        self.health.as_deref()
    }

    fn reset_results(&mut self) {
        self.switchyard = None;
        self.running = None;
        self.error = None;
        self.health = None;
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
