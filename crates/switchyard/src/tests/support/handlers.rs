//! Handlers whose timing the tests control.

use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};

use crate::context::InvocationContext;
use crate::reactive::{HandlerError, Reactive};
use crate::registry::SubscriptionHandler;

/// Subscription handler that parks every subscribe until [`Gate::open`].
#[derive(Debug, Clone)]
pub struct Gate {
    entered: Arc<Notify>,
    open: Arc<Semaphore>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            open: Arc::new(Semaphore::new(0)),
        }
    }

    /// Resolves once a subscribe has reached the handler.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets parked and future subscribes through.
    pub fn open(&self) {
        self.open.add_permits(1);
    }
}

impl SubscriptionHandler for Gate {
    type Request = ();
    type Response = &'static str;

    async fn subscribe(
        &self,
        (): (),
        _context: &InvocationContext,
    ) -> Result<Reactive<&'static str>, HandlerError> {
        self.entered.notify_one();
        let _permit = self
            .open
            .acquire()
            .await
            .map_err(|_| HandlerError::new("gate closed"))?;
        Ok(Reactive::constant("open"))
    }
}
