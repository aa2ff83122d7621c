//! Single-slot holder for a subscription's current invocation context.

use std::sync::Arc;

use tokio::sync::watch;

use super::InvocationContext;

/// Replaceable reference to the live [`InvocationContext`] of one
/// subscription.
///
/// Readers always observe either the previous or the next context, never a
/// missing one, because [`ContextSlot::replace`] swaps the value in a single
/// step and hands the old context back for the caller to close afterwards.
#[derive(Debug)]
pub struct ContextSlot {
    current: watch::Sender<Option<Arc<InvocationContext>>>,
}

impl ContextSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Creates a slot already holding `context`.
    #[must_use]
    pub fn holding(context: Arc<InvocationContext>) -> Self {
        let (current, _) = watch::channel(Some(context));
        Self { current }
    }

    /// Sets the first context.
    ///
    /// # Errors
    ///
    /// Hands `context` back unchanged if the slot is already occupied.
    pub fn install(&self, context: Arc<InvocationContext>) -> Result<(), Arc<InvocationContext>> {
        let mut rejected = None;
        self.current.send_if_modified(|slot| {
            if slot.is_some() {
                rejected = Some(Arc::clone(&context));
                return false;
            }
            *slot = Some(Arc::clone(&context));
            true
        });
        rejected.map_or(Ok(()), Err)
    }

    /// Swaps in `context` and returns the context it displaced.
    ///
    /// The caller must close the returned context; it is no longer reachable
    /// through the slot.
    pub fn replace(&self, context: Arc<InvocationContext>) -> Option<Arc<InvocationContext>> {
        self.current.send_replace(Some(context))
    }

    /// Context visible right now.
    #[must_use]
    pub fn current(&self) -> Option<Arc<InvocationContext>> {
        self.current.borrow().clone()
    }

    /// Empties the slot and closes the context it held.
    ///
    /// Returns `true` if a context was closed by this call.
    pub fn close(&self) -> bool {
        self.current
            .send_replace(None)
            .is_some_and(|context| context.close())
    }
}

impl Default for ContextSlot {
    fn default() -> Self {
        Self::new()
    }
}
