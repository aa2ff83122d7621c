//! Resource scope owned by one invocation.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

type Finalizer = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ScopeState {
    closed: bool,
    finalizers: Vec<Finalizer>,
}

/// Cancellation token plus release callbacks, closed exactly once.
///
/// Closing cancels the token, which aborts any decode, validation, or
/// computation racing against [`Scope::cancelled`], then runs finalizers in
/// reverse registration order. Dropping an open scope closes it.
pub struct Scope {
    token: CancellationToken,
    state: Mutex<ScopeState>,
}

impl Scope {
    /// Creates a root scope.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Creates a scope that is also cancelled when `parent` is.
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::with_token(parent.child_token())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// Token cancelled when the scope closes.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the scope is closed or its parent is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Registers a release callback. Runs immediately if already closed.
    pub fn add_finalizer(&self, finalizer: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            drop(state);
            finalizer();
            return;
        }
        state.finalizers.push(Box::new(finalizer));
    }

    /// Returns `true` once [`Scope::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Cancels the token and runs finalizers.
    ///
    /// Returns `true` for the call that performed the close and `false` for
    /// every later call.
    pub fn close(&self) -> bool {
        let finalizers = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.finalizers)
        };
        self.token.cancel();
        for finalizer in finalizers.into_iter().rev() {
            finalizer();
        }
        true
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("closed", &self.is_closed())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
