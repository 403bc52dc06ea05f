//! Binding registry with parent-delegated lookups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;
use weave_core::{BindingError, ProviderKey, ProviderScope};

use crate::binding::Binding;
use crate::provider::{Injectable, Instance, ProviderConfig};
use crate::resolver::Resolver;

/// A per-module binding registry.
///
/// Lookups check, in order:
///
/// 1. the application-wide override container (core providers), if attached
/// 2. the local binding table
/// 3. the parent container, recursively
///
/// Registration takes `&self`; the tables are behind `RwLock`s so that a container can
/// be shared (`Arc<Container>`) while the module graph is still being built. After
/// bootstrap the container is [frozen](Container::freeze) and only read.
pub struct Container {
    name: String,
    parent: Option<Arc<Container>>,
    overrides: Option<Arc<Container>>,
    bindings: RwLock<HashMap<ProviderKey, Arc<Binding>>>,
    tags: RwLock<HashMap<String, ProviderKey>>,
    frozen: AtomicBool,
}

impl Container {
    /// Create a root container (no parent).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            overrides: None,
            bindings: RwLock::new(HashMap::new()),
            tags: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Create a container whose lookups fall back to `parent`.
    ///
    /// The parent's override container is inherited.
    pub fn child(name: impl Into<String>, parent: Arc<Container>) -> Self {
        let overrides = parent.overrides.clone();
        Self {
            parent: Some(parent),
            overrides,
            ..Self::new(name)
        }
    }

    /// Attach the application-wide override container.
    pub fn with_overrides(mut self, overrides: Arc<Container>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Container>> {
        self.parent.as_ref()
    }

    pub fn overrides(&self) -> Option<&Arc<Container>> {
        self.overrides.as_ref()
    }

    /// Install a provider. A later registration for the same key replaces the
    /// earlier one.
    pub fn add(&self, provider: &ProviderConfig) -> Result<(), BindingError> {
        let key = provider.key();
        self.ensure_writable(key)?;

        let binding = Arc::new(Binding::from_config(provider));
        self.write_bindings().insert(key, binding);
        if let Some(tag) = provider.tag_name() {
            self.write_tags().insert(tag.to_string(), key);
        }

        debug!(
            container = %self.name,
            provider = %key,
            scope = %provider.scope_kind(),
            "provider registered"
        );
        Ok(())
    }

    /// Bind `T` to its own constructor with the given scope.
    pub fn register<T: Injectable>(&self, scope: ProviderScope) -> Result<(), BindingError> {
        self.add(&ProviderConfig::class::<T>().scope(scope))
    }

    /// Bind a pre-built value as a singleton.
    pub fn register_instance<T: Send + Sync + 'static>(&self, value: T) -> Result<(), BindingError> {
        self.add(&ProviderConfig::value(value))
    }

    /// Bind a pre-built shared value (possibly a trait object) as a singleton.
    pub fn register_shared<T: ?Sized + Send + Sync + 'static>(
        &self,
        value: Arc<T>,
    ) -> Result<(), BindingError> {
        self.add(&ProviderConfig::shared(value))
    }

    pub fn register_singleton<T, F>(&self, factory: F) -> Result<(), BindingError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BindingError> + Send + Sync + 'static,
    {
        self.add(&ProviderConfig::factory(factory).singleton())
    }

    pub fn register_transient<T, F>(&self, factory: F) -> Result<(), BindingError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BindingError> + Send + Sync + 'static,
    {
        self.add(&ProviderConfig::factory(factory).transient())
    }

    pub fn register_scoped<T, F>(&self, factory: F) -> Result<(), BindingError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BindingError> + Send + Sync + 'static,
    {
        self.add(&ProviderConfig::factory(factory).request_scoped())
    }

    /// Make `key` resolvable here by resolving it in `source`.
    ///
    /// Returns `Ok(false)` without changes when a local binding for `key` already
    /// exists (local bindings win over delegated ones).
    pub fn register_delegate(
        &self,
        key: ProviderKey,
        source: &Arc<Container>,
    ) -> Result<bool, BindingError> {
        self.ensure_writable(key)?;
        if self.contains_local(key) {
            return Ok(false);
        }

        let tag = source.local(key).and_then(|b| b.tag().map(str::to_string));
        if let Some(tag) = &tag {
            self.write_tags().entry(tag.clone()).or_insert(key);
        }
        self.write_bindings()
            .insert(key, Arc::new(Binding::delegate(key, source.clone(), tag)));

        debug!(
            container = %self.name,
            provider = %key,
            source = %source.name,
            "provider delegated"
        );
        Ok(true)
    }

    /// Reject any further registration.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Resolve `T` from this container's chain.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        Resolver::new(self).get::<T>()
    }

    /// Resolve the provider registered under `tag`.
    pub fn get_tagged<T: ?Sized + Send + Sync + 'static>(
        &self,
        tag: &str,
    ) -> Result<Arc<T>, BindingError> {
        Resolver::new(self).get_tagged::<T>(tag)
    }

    /// Resolve `key` without knowing its type statically.
    pub fn get_instance(&self, key: ProviderKey) -> Result<Instance, BindingError> {
        Resolver::new(self).resolve_key(key)
    }

    /// Whether `key` is resolvable from this container's chain.
    pub fn contains(&self, key: ProviderKey) -> bool {
        self.find(key).is_some()
    }

    /// Whether `key` has a binding in this container's own table.
    pub fn contains_local(&self, key: ProviderKey) -> bool {
        self.read_bindings().contains_key(&key)
    }

    /// Keys of the local binding table (unordered).
    pub fn local_keys(&self) -> Vec<ProviderKey> {
        self.read_bindings().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read_bindings().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn local(&self, key: ProviderKey) -> Option<Arc<Binding>> {
        self.read_bindings().get(&key).cloned()
    }

    /// Find the binding for `key` and the container that owns it.
    pub(crate) fn find(&self, key: ProviderKey) -> Option<(Arc<Binding>, &Container)> {
        if let Some(overrides) = &self.overrides {
            if let Some(binding) = overrides.local(key) {
                return Some((binding, overrides.as_ref()));
            }
        }
        self.find_in_chain(key)
    }

    fn find_in_chain(&self, key: ProviderKey) -> Option<(Arc<Binding>, &Container)> {
        match self.local(key) {
            Some(binding) => Some((binding, self)),
            None => self.parent.as_ref()?.find_in_chain(key),
        }
    }

    pub(crate) fn find_tag(&self, tag: &str) -> Option<ProviderKey> {
        if let Some(key) = self.overrides.as_ref().and_then(|o| o.local_tag(tag)) {
            return Some(key);
        }
        let mut current = Some(self);
        while let Some(container) = current {
            if let Some(key) = container.local_tag(tag) {
                return Some(key);
            }
            current = container.parent.as_deref();
        }
        None
    }

    fn local_tag(&self, tag: &str) -> Option<ProviderKey> {
        self.tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .copied()
    }

    fn ensure_writable(&self, key: ProviderKey) -> Result<(), BindingError> {
        if self.is_frozen() {
            return Err(BindingError::Frozen {
                container: self.name.clone(),
                provider: key.to_string(),
            });
        }
        Ok(())
    }

    fn read_bindings(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ProviderKey, Arc<Binding>>> {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_bindings(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<ProviderKey, Arc<Binding>>> {
        self.bindings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tags(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ProviderKey>> {
        self.tags.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for Container {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut keys: Vec<&'static str> =
            self.local_keys().iter().map(ProviderKey::type_name).collect();
        keys.sort_unstable();
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("bindings", &keys)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
