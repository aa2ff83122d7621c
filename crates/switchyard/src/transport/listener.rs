//! TCP listener serving the gateway router.

use std::io;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use switchyard_config::ListenEndpoint;

use super::{ListenerError, TRANSPORT_TARGET};

/// Listener bound to the configured endpoint.
#[derive(Debug)]
pub struct GatewayListener {
    endpoint: ListenEndpoint,
    listener: TcpListener,
}

impl GatewayListener {
    /// Binds to `endpoint`. Port `0` picks a free port.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Bind`] if the address cannot be resolved or
    /// bound.
    pub async fn bind(endpoint: &ListenEndpoint) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind((endpoint.host(), endpoint.port()))
            .await
            .map_err(|source| ListenerError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::LocalAddr`] if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })
    }

    /// Serves `app` on a background task.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::LocalAddr`] if the bound address cannot be
    /// read.
    pub fn start(self, app: Router) -> Result<ListenerHandle, ListenerError> {
        let local_addr = self.local_addr()?;
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let endpoint = self.endpoint;
        let listener = self.listener;
        let task = tokio::spawn(async move {
            info!(
                target: TRANSPORT_TARGET,
                endpoint = %endpoint,
                address = %local_addr,
                "gateway listener active"
            );
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
        });
        Ok(ListenerHandle {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }
}

/// Handle to the background listener task.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl ListenerHandle {
    /// Address the listener is serving on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting new connections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Waits for the listener task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Serve`] if serving failed and
    /// [`ListenerError::TaskPanic`] if the task panicked.
    pub async fn join(mut self) -> Result<(), ListenerError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ListenerError::Serve { source }),
            Err(_) => Err(ListenerError::TaskPanic),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
