//! Installed bindings (the runtime form of a [`ProviderConfig`]).

use std::sync::{Arc, OnceLock};

use weave_core::{ProviderKey, ProviderScope};

use crate::container::Container;
use crate::provider::{DisposeFn, FactoryFn, Implementation, Instance, ProviderConfig};

/// How a binding produces its instance.
#[derive(Clone)]
pub enum Strategy {
    /// Shared pre-built value.
    Value(Instance),
    /// Run a constructor (class or factory), cached according to scope.
    Construct(FactoryFn),
    /// Resolve the same key in another container (exports and core overrides).
    Delegate(Arc<Container>),
}

/// One entry of a container's binding table.
pub struct Binding {
    key: ProviderKey,
    scope: ProviderScope,
    strategy: Strategy,
    tag: Option<String>,
    on_dispose: Option<DisposeFn>,
    singleton: OnceLock<Instance>,
}

impl Binding {
    pub(crate) fn from_config(config: &ProviderConfig) -> Self {
        let strategy = match config.implementation() {
            Implementation::Value(value) => Strategy::Value(value.clone()),
            Implementation::Class(factory) | Implementation::Factory(factory) => {
                Strategy::Construct(factory.clone())
            }
        };

        Self {
            key: config.key(),
            scope: config.scope_kind(),
            strategy,
            tag: config.tag_name().map(str::to_string),
            on_dispose: config.dispose_hook(),
            singleton: OnceLock::new(),
        }
    }

    pub(crate) fn delegate(key: ProviderKey, source: Arc<Container>, tag: Option<String>) -> Self {
        Self {
            key,
            scope: ProviderScope::Singleton,
            strategy: Strategy::Delegate(source),
            tag,
            on_dispose: None,
            singleton: OnceLock::new(),
        }
    }

    pub fn key(&self) -> ProviderKey {
        self.key
    }

    pub fn scope(&self) -> ProviderScope {
        self.scope
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self.strategy, Strategy::Delegate(_))
    }

    pub(crate) fn dispose_hook(&self) -> Option<DisposeFn> {
        self.on_dispose.clone()
    }

    pub(crate) fn cached_singleton(&self) -> Option<Instance> {
        self.singleton.get().cloned()
    }

    /// Store a freshly built singleton; if another thread won the race, its instance
    /// is kept and returned instead.
    pub(crate) fn store_singleton(&self, instance: Instance) -> Instance {
        self.singleton.get_or_init(|| instance).clone()
    }
}

impl core::fmt::Debug for Binding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Value(_) => "value".to_string(),
            Strategy::Construct(_) => "construct".to_string(),
            Strategy::Delegate(source) => format!("delegate({})", source.name()),
        };
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("strategy", &strategy)
            .field("tag", &self.tag)
            .finish()
    }
}
