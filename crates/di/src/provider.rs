//! Provider declarations: what to build, how, and for how long.

use std::any::Any;
use std::sync::Arc;

use weave_core::{BindingError, ProviderKey, ProviderScope};

use crate::container::Container;
use crate::resolver::Resolver;

/// A type-erased provider instance.
///
/// The erased value is always an `Arc<T>` where `T` is the provided type, so both
/// concrete types and trait objects (`Arc<dyn Trait>`) can be stored uniformly.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased constructor of a provider.
pub type FactoryFn = Arc<dyn Fn(&Resolver<'_>) -> Result<Instance, BindingError> + Send + Sync>;

/// Type-erased request-scope disposal hook.
pub type DisposeFn = Arc<dyn Fn(&Instance) + Send + Sync>;

pub(crate) fn factory_fn<F>(factory: F) -> FactoryFn
where
    F: Fn(&Resolver<'_>) -> Result<Instance, BindingError> + Send + Sync + 'static,
{
    Arc::new(factory)
}

pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

/// Recover the typed value from an [`Instance`].
pub fn unerase<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

/// A type that can construct itself from resolved dependencies.
///
/// This is the "class" construction strategy: registering an `Injectable` type binds
/// the type to its own constructor.
///
/// ```ignore
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Injectable for UserService {
///     fn inject(resolver: &Resolver<'_>) -> Result<Self, BindingError> {
///         Ok(Self { db: resolver.get()? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn inject(resolver: &Resolver<'_>) -> Result<Self, BindingError>;
}

/// Construction strategy of a provider.
#[derive(Clone)]
pub enum Implementation {
    /// The provided type is bound to its own [`Injectable`] constructor.
    Class(FactoryFn),
    /// A pre-built value, shared by every consumer.
    Value(Instance),
    /// A user supplied factory closure.
    Factory(FactoryFn),
}

impl core::fmt::Debug for Implementation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Implementation::Class(_) => "Class",
            Implementation::Value(_) => "Value",
            Implementation::Factory(_) => "Factory",
        })
    }
}

/// Declarative description of one provider.
///
/// `ProviderConfig` is plain data until it is installed into a [`Container`] with
/// [`ProviderConfig::register`]. Modules carry lists of these in their metadata.
///
/// - `export` makes the provider visible to modules depending on the owning module.
/// - `tag` adds a secondary string lookup key.
/// - `core` hoists the provider into the application-wide override list, which takes
///   priority over local bindings in every module.
///
/// Pre-built values ignore `scope`: they are always shared.
#[derive(Clone)]
pub struct ProviderConfig {
    provided: ProviderKey,
    implementation: Implementation,
    scope: ProviderScope,
    export: bool,
    tag: Option<String>,
    core: bool,
    on_dispose: Option<DisposeFn>,
}

impl ProviderConfig {
    fn new(provided: ProviderKey, implementation: Implementation) -> Self {
        Self {
            provided,
            implementation,
            scope: ProviderScope::Singleton,
            export: false,
            tag: None,
            core: false,
            on_dispose: None,
        }
    }

    /// Bind `T` to its own constructor.
    pub fn class<T: Injectable>() -> Self {
        let factory = factory_fn(|r| Ok(erase(Arc::new(T::inject(r)?))));
        Self::new(ProviderKey::of::<T>(), Implementation::Class(factory))
    }

    /// Bind `T` to a pre-built value.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Bind `T` (possibly a trait object) to a pre-built shared value.
    pub fn shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self::new(ProviderKey::of::<T>(), Implementation::Value(erase(value)))
    }

    /// Bind `T` (possibly a trait object) to a factory closure.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BindingError> + Send + Sync + 'static,
    {
        let factory = factory_fn(move |r| factory(r).map(erase));
        Self::new(ProviderKey::of::<T>(), Implementation::Factory(factory))
    }

    pub fn scope(mut self, scope: ProviderScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn singleton(self) -> Self {
        self.scope(ProviderScope::Singleton)
    }

    pub fn transient(self) -> Self {
        self.scope(ProviderScope::Transient)
    }

    pub fn request_scoped(self) -> Self {
        self.scope(ProviderScope::Request)
    }

    pub fn export(mut self) -> Self {
        self.export = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn core(mut self) -> Self {
        self.core = true;
        self
    }

    /// Run `hook` when a request scope holding an instance of this provider ends.
    ///
    /// Only meaningful for request-scoped providers.
    pub fn on_dispose<T, F>(mut self, hook: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let dispose: DisposeFn = Arc::new(move |instance: &Instance| {
            if let Some(value) = unerase::<T>(instance) {
                hook(&value);
            }
        });
        self.on_dispose = Some(dispose);
        self
    }

    pub fn key(&self) -> ProviderKey {
        self.provided
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn scope_kind(&self) -> ProviderScope {
        match self.implementation {
            Implementation::Value(_) => ProviderScope::Singleton,
            _ => self.scope,
        }
    }

    pub fn is_exported(&self) -> bool {
        self.export
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn is_core(&self) -> bool {
        self.core
    }

    pub(crate) fn dispose_hook(&self) -> Option<DisposeFn> {
        self.on_dispose.clone()
    }

    /// Install this provider into `container`.
    pub fn register(&self, container: &Container) -> Result<(), BindingError> {
        container.add(self)
    }
}

impl core::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provided", &self.provided)
            .field("implementation", &self.implementation)
            .field("scope", &self.scope_kind())
            .field("export", &self.export)
            .field("tag", &self.tag)
            .field("core", &self.core)
            .finish()
    }
}
