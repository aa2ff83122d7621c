//! Handler registry.
//!
//! Business modules describe their handlers through [`SubscriptionHandler`]
//! and [`MutationHandler`] and register them on a [`RegistryBuilder`] at
//! startup. The built [`Registry`] is immutable and cheap to clone; lookups
//! are keyed by handler kind and name.

mod errors;
mod handler;

use std::collections::HashMap;
use std::sync::Arc;

use strum::{Display, EnumString};

pub use self::errors::RegistryError;
pub use self::handler::{MutationHandler, SubscriptionHandler};
pub(crate) use self::handler::{Computation, UpdateStream};

use crate::shape::RequestShape;

/// Operation kind of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HandlerKind {
    /// Long-lived reactive computation; also serves one-shot reads.
    Subscription,
    /// Single request, single result.
    Mutation,
}

/// Declared request layout of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeInfo {
    /// Rust type of the request.
    pub type_name: &'static str,
    /// Number of payload chunks the request consumes.
    pub chunks: usize,
}

impl ShapeInfo {
    fn of<R: RequestShape>() -> Self {
        Self {
            type_name: std::any::type_name::<R>(),
            chunks: R::CHUNKS,
        }
    }
}

/// Static description of a registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Name clients address the handler by.
    pub name: String,
    /// Which registry the handler lives in.
    pub kind: HandlerKind,
    /// Request layout.
    pub request: ShapeInfo,
    /// Rust type of each response value.
    pub response: &'static str,
}

/// A handler's configuration paired with its computation.
#[derive(Clone)]
pub struct HandlerEntry {
    config: HandlerConfig,
    computation: Computation,
}

impl HandlerEntry {
    /// Wraps a subscription handler.
    pub fn subscription<H: SubscriptionHandler>(name: impl Into<String>, handler: H) -> Self {
        Self {
            config: HandlerConfig {
                name: name.into(),
                kind: HandlerKind::Subscription,
                request: ShapeInfo::of::<H::Request>(),
                response: std::any::type_name::<H::Response>(),
            },
            computation: Computation::Subscription(Arc::new(handler)),
        }
    }

    /// Wraps a mutation handler.
    pub fn mutation<H: MutationHandler>(name: impl Into<String>, handler: H) -> Self {
        Self {
            config: HandlerConfig {
                name: name.into(),
                kind: HandlerKind::Mutation,
                request: ShapeInfo::of::<H::Request>(),
                response: std::any::type_name::<H::Response>(),
            },
            computation: Computation::Mutation(Arc::new(handler)),
        }
    }

    /// Declared configuration.
    #[must_use]
    pub const fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Handler kind.
    #[must_use]
    pub const fn kind(&self) -> HandlerKind {
        self.config.kind
    }

    pub(crate) const fn computation(&self) -> &Computation {
        &self.computation
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

type HandlerMap = HashMap<String, HandlerEntry>;

/// Immutable, name-keyed handler tables.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    subscriptions: Arc<HandlerMap>,
    mutations: Arc<HandlerMap>,
}

impl Registry {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Finds the handler registered under `name` for `kind`.
    #[must_use]
    pub fn lookup(&self, kind: HandlerKind, name: &str) -> Option<&HandlerEntry> {
        self.table(kind).get(name)
    }

    /// Registered names of one kind, sorted.
    #[must_use]
    pub fn names(&self, kind: HandlerKind) -> Vec<&str> {
        let mut names: Vec<&str> = self.table(kind).keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len() + self.mutations.len()
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self, kind: HandlerKind) -> &HandlerMap {
        match kind {
            HandlerKind::Subscription => &self.subscriptions,
            HandlerKind::Mutation => &self.mutations,
        }
    }
}

/// Accumulates handlers before the registry is frozen.
///
/// Every method consumes the builder and returns it, so a module can expose
/// its handlers as a function `fn(RegistryBuilder) -> Result<RegistryBuilder,
/// RegistryError>` and modules compose with `?`.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    subscriptions: HandlerMap,
    mutations: HandlerMap,
}

impl RegistryBuilder {
    /// Registers a subscription handler.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::register`].
    pub fn subscription<H: SubscriptionHandler>(
        self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.register(HandlerEntry::subscription(name, handler))
    }

    /// Registers a mutation handler.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::register`].
    pub fn mutation<H: MutationHandler>(
        self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.register(HandlerEntry::mutation(name, handler))
    }

    /// Adds an entry to the table for its kind.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyName`] for a blank name and
    /// [`RegistryError::Duplicate`] if the name is taken within the kind.
    pub fn register(mut self, entry: HandlerEntry) -> Result<Self, RegistryError> {
        if entry.name().trim().is_empty() {
            return Err(RegistryError::EmptyName { kind: entry.kind() });
        }
        let table = match entry.kind() {
            HandlerKind::Subscription => &mut self.subscriptions,
            HandlerKind::Mutation => &mut self.mutations,
        };
        if table.contains_key(entry.name()) {
            return Err(RegistryError::duplicate(entry.kind(), entry.name()));
        }
        table.insert(entry.name().to_owned(), entry);
        Ok(self)
    }

    /// Adds every handler from `other`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] for the first name both builders
    /// define within the same kind.
    pub fn merge(self, other: Self) -> Result<Self, RegistryError> {
        let mut entries: Vec<HandlerEntry> = other
            .subscriptions
            .into_values()
            .chain(other.mutations.into_values())
            .collect();
        entries.sort_by(|left, right| left.name().cmp(right.name()));
        entries.into_iter().try_fold(self, Self::register)
    }

    /// Freezes the tables.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            subscriptions: Arc::new(self.subscriptions),
            mutations: Arc::new(self.mutations),
        }
    }
}
