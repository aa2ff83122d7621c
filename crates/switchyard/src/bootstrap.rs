//! Gateway bootstrap orchestration.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::info;

use switchyard_config::Config;

use crate::health::HealthReporter;
use crate::registry::Registry;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{self, Gateway, GatewayListener, ListenerError, ListenerHandle};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns the layered loader's error when any source is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The listener could not be bound or stopped cleanly.
    #[error("gateway listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Switchyard {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Switchyard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchyard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Switchyard {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds the configured endpoint and starts serving `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Listener`] if the endpoint cannot be bound.
    pub async fn start(self, registry: Registry) -> Result<RunningGateway, BootstrapError> {
        let listener = match GatewayListener::bind(self.config.listen()).await {
            Ok(listener) => listener,
            Err(source) => return Err(self.fail(source)),
        };
        let gateway = Arc::new(Gateway::new(
            registry,
            &self.config,
            Arc::clone(&self.reporter),
        ));
        let listener = match listener.start(transport::router(Arc::clone(&gateway))) {
            Ok(handle) => handle,
            Err(source) => return Err(self.fail(source)),
        };
        self.reporter.listener_ready(listener.local_addr());
        Ok(RunningGateway { gateway, listener })
    }

    /// Serves `registry` until `shutdown` resolves, then stops cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Listener`] if binding or serving fails.
    pub async fn serve<F>(self, registry: Registry, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()>,
    {
        let running = self.start(registry).await?;
        shutdown.await;
        running.stop().await
    }

    fn fail(&self, source: ListenerError) -> BootstrapError {
        let error = BootstrapError::Listener { source };
        self.reporter.bootstrap_failed(&error);
        error
    }
}

/// A gateway accepting connections.
#[derive(Debug)]
pub struct RunningGateway {
    gateway: Arc<Gateway>,
    listener: ListenerHandle,
}

impl RunningGateway {
    /// Address the listener is serving on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Shared dispatchers, for inspection.
    #[must_use]
    pub const fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Stops accepting connections, closes open sockets and waits for the
    /// listener to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Listener`] if the listener task failed.
    pub async fn stop(self) -> Result<(), BootstrapError> {
        self.listener.shutdown();
        let cleanups = self.gateway.close_all().await;
        info!(target: BOOTSTRAP_TARGET, cleanups, "gateway stopping");
        self.listener
            .join()
            .await
            .map_err(|source| BootstrapError::Listener { source })
    }
}

/// Bootstraps the gateway using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails; the
/// reporter sees the same error first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Switchyard, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Switchyard {
        config,
        telemetry,
        reporter,
    })
}

/// Bootstraps, serves `registry` until `shutdown` resolves, then stops.
///
/// # Errors
///
/// Returns the first [`BootstrapError`] encountered.
pub async fn run<F>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    registry: Registry,
    shutdown: F,
) -> Result<(), BootstrapError>
where
    F: Future<Output = ()>,
{
    bootstrap_with(loader, reporter)?
        .serve(registry, shutdown)
        .await
}
