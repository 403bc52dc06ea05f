//! Dynamic modules: one-shot metadata patches computed at build time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use weave_core::{ConfigurationError, ModuleType, ProviderKey};
use weave_di::ProviderConfig;

use crate::catalog::ModuleCatalog;
use crate::controller::{CommandDescriptor, ControllerDescriptor, RouterDescriptor};
use crate::descriptor::{ModuleKind, ModuleSource};
use crate::module::Module;

/// Additional providers, controllers, routers, commands and exports for one
/// module.
///
/// Clones share the "configured" flag, so a dynamic module referenced from several
/// places is still applied once.
///
/// ```ignore
/// impl DatabaseModule {
///     pub fn setup(url: &str) -> DynamicModule {
///         DynamicModule::new::<Self>()
///             .provider(ProviderConfig::value(DatabaseUrl(url.into())).export())
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DynamicModule {
    source: ModuleSource,
    providers: Vec<ProviderConfig>,
    controllers: Vec<ControllerDescriptor>,
    routers: Vec<RouterDescriptor>,
    commands: Vec<CommandDescriptor>,
    exports: Vec<ProviderKey>,
    configured: Arc<AtomicBool>,
}

impl DynamicModule {
    pub fn new<M: Module>() -> Self {
        Self::from_source(ModuleSource::of::<M>())
    }

    pub fn from_source(source: ModuleSource) -> Self {
        Self {
            source,
            providers: Vec::new(),
            controllers: Vec::new(),
            routers: Vec::new(),
            commands: Vec::new(),
            exports: Vec::new(),
            configured: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn controller(mut self, controller: ControllerDescriptor) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn router(mut self, router: RouterDescriptor) -> Self {
        self.routers.push(router);
        self
    }

    pub fn command(mut self, command: CommandDescriptor) -> Self {
        self.commands.push(command);
        self
    }

    pub fn export<T: ?Sized + 'static>(mut self) -> Self {
        self.exports.push(ProviderKey::of::<T>());
        self
    }

    pub fn module(&self) -> ModuleType {
        self.source.module()
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn controllers(&self) -> &[ControllerDescriptor] {
        &self.controllers
    }

    pub fn routers(&self) -> &[RouterDescriptor] {
        &self.routers
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    pub fn exports(&self) -> &[ProviderKey] {
        &self.exports
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Merge this patch into the target module's declaration.
    ///
    /// Returns `Ok(false)` if the patch was already applied. The target must be
    /// declared in `catalog` and must not be a plain module.
    pub fn apply_configuration(&self, catalog: &mut ModuleCatalog) -> Result<bool, ConfigurationError> {
        if self.is_configured() {
            debug!(module = %self.module(), "dynamic module already applied");
            return Ok(false);
        }

        let module = self.module();
        let descriptor = catalog.get(module).ok_or_else(|| {
            ConfigurationError::not_a_module(module.path(), "the module is not declared")
        })?;
        if descriptor.kind() == ModuleKind::Plain {
            return Err(ConfigurationError::not_a_module(
                module.path(),
                "plain modules cannot be configured dynamically",
            ));
        }

        catalog.apply_patch(self)?;
        self.configured.store(true, Ordering::Release);
        Ok(true)
    }
}
