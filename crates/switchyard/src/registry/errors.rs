//! Errors raised while assembling a registry.

use thiserror::Error;

use super::HandlerKind;

/// Configuration errors caught at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two handlers of the same kind share a name.
    #[error("duplicate {kind} handler '{name}'")]
    Duplicate { kind: HandlerKind, name: String },

    /// A handler was registered without a name.
    #[error("{kind} handler registered with an empty name")]
    EmptyName { kind: HandlerKind },
}

impl RegistryError {
    /// Creates a duplicate-name error.
    pub fn duplicate(kind: HandlerKind, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
        }
    }
}
