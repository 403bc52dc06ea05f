//! The module contract.

use std::sync::Arc;

use weave_core::{BindingError, ModuleType};
use weave_di::{Container, ProviderConfig};

use crate::application::Application;
use crate::config::Config;
use crate::descriptor::ModuleDescriptor;

/// A unit of application composition.
///
/// `declare` describes the module (providers, controllers, imports, exports). The
/// instance itself is created during the service-registration pass, after every
/// dependency has registered and exported its providers, so `create` can resolve
/// them from [`ModuleInit`].
///
/// ```ignore
/// struct UsersModule;
///
/// impl Module for UsersModule {
///     fn declare() -> ModuleDescriptor {
///         ModuleDescriptor::builder::<Self>()
///             .provider(ProviderConfig::class::<UserService>().export())
///             .import::<DatabaseModule>()
///             .build()
///     }
///
///     fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
///         Ok(Self)
///     }
/// }
/// ```
pub trait Module: Send + Sync + Sized + 'static {
    fn declare() -> ModuleDescriptor;

    fn create(init: &ModuleInit<'_>) -> anyhow::Result<Self>;

    /// Register additional providers into the module's own container.
    fn register_services(&self, _container: &Container) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once, after the whole application is built.
    fn application_ready(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Object-safe view of a constructed module's hooks.
pub trait ModuleHooks: Send + Sync {
    fn register_services(&self, container: &Container) -> anyhow::Result<()>;

    fn application_ready(&self, app: &Application) -> anyhow::Result<()>;
}

impl<M: Module> ModuleHooks for M {
    fn register_services(&self, container: &Container) -> anyhow::Result<()> {
        Module::register_services(self, container)
    }

    fn application_ready(&self, app: &Application) -> anyhow::Result<()> {
        Module::application_ready(self, app)
    }
}

/// What a module can see while it is being constructed.
pub struct ModuleInit<'a> {
    module: ModuleType,
    name: &'a str,
    container: &'a Arc<Container>,
    config: &'a Config,
}

impl<'a> ModuleInit<'a> {
    pub(crate) fn new(
        module: ModuleType,
        name: &'a str,
        container: &'a Arc<Container>,
        config: &'a Config,
    ) -> Self {
        Self {
            module,
            name,
            container,
            config,
        }
    }

    pub fn module(&self) -> ModuleType {
        self.module
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn container(&self) -> &Arc<Container> {
        self.container
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        self.container.get::<T>()
    }
}

/// A constructed module: its hooks plus the provider binding the instance itself.
pub struct ModuleInstance {
    pub(crate) hooks: Arc<dyn ModuleHooks>,
    pub(crate) provider: ProviderConfig,
}

pub(crate) type Constructor = fn(&ModuleInit<'_>) -> anyhow::Result<ModuleInstance>;

pub(crate) fn construct<M: Module>(init: &ModuleInit<'_>) -> anyhow::Result<ModuleInstance> {
    let module = Arc::new(M::create(init)?);
    Ok(ModuleInstance {
        hooks: module.clone(),
        provider: ProviderConfig::shared(module),
    })
}
