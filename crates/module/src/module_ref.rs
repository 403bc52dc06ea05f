//! Runtime wrapper around one declared module.

use std::sync::Arc;

use tracing::{debug, debug_span, warn};
use weave_core::{ConfigurationError, ModuleType, ProviderKey, ProviderScope, WeaveError};
use weave_di::Container;

use crate::application::Application;
use crate::config::Config;
use crate::controller::{CommandDescriptor, Route};
use crate::descriptor::{ModuleDescriptor, ModuleKind};
use crate::module::{ModuleHooks, ModuleInit};

/// Build-out stage of a [`ModuleRef`]. Stages only move forward.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleState {
    Unregistered,
    /// Module contract validated.
    Registered,
    /// Providers, controllers and routers installed into the module container.
    DependenciesBuilt,
    /// Module instance constructed and its `register_services` hook run.
    ServicesRegistered,
    /// `application_ready` hook run.
    ApplicationReady,
}

impl core::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ModuleState::Unregistered => "unregistered",
            ModuleState::Registered => "registered",
            ModuleState::DependenciesBuilt => "dependencies built",
            ModuleState::ServicesRegistered => "services registered",
            ModuleState::ApplicationReady => "application ready",
        })
    }
}

/// One module of a built application: its declaration, its container and the
/// routes it contributes.
///
/// Every lifecycle step is idempotent. Calling a step whose predecessor has not
/// run is a configuration error.
pub struct ModuleRef {
    descriptor: Arc<ModuleDescriptor>,
    container: Arc<Container>,
    config: Config,
    state: ModuleState,
    routes: Vec<Route>,
    core_hoisted: bool,
    instance: Option<Arc<dyn ModuleHooks>>,
}

impl ModuleRef {
    pub fn new(descriptor: Arc<ModuleDescriptor>, container: Arc<Container>, config: Config) -> Self {
        Self {
            descriptor,
            container,
            config,
            state: ModuleState::Unregistered,
            routes: Vec::new(),
            core_hoisted: false,
            instance: None,
        }
    }

    pub fn module(&self) -> ModuleType {
        self.descriptor.module()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<ModuleDescriptor> {
        &self.descriptor
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Routes declared by this module's own controllers and routers.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn exports(&self) -> Vec<ProviderKey> {
        self.descriptor.exports()
    }

    /// Keys of the providers declared by this module.
    pub fn providers(&self) -> Vec<ProviderKey> {
        self.descriptor.providers().iter().map(|p| p.key()).collect()
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        self.descriptor.commands()
    }

    /// The module instance, once constructed.
    pub fn instance<M: Send + Sync + 'static>(&self) -> Option<Arc<M>> {
        self.instance.as_ref()?;
        self.container.get::<M>().ok()
    }

    fn require(&self, step: &str, state: ModuleState) -> Result<(), ConfigurationError> {
        if self.state < state {
            return Err(ConfigurationError::invalid_module(
                self.name(),
                format!("`{step}` requires the module to be {state}, but it is {}", self.state),
            ));
        }
        Ok(())
    }

    fn advance(&mut self, state: ModuleState) {
        debug!(module = %self.name(), from = %self.state, to = %state, "module state changed");
        self.state = state;
    }

    /// Validate the module contract.
    pub fn register(&mut self) -> Result<(), ConfigurationError> {
        if self.state >= ModuleState::Registered {
            return Ok(());
        }
        self.validate_module_type()?;
        self.advance(ModuleState::Registered);
        Ok(())
    }

    fn validate_module_type(&self) -> Result<(), ConfigurationError> {
        let descriptor = &self.descriptor;
        match descriptor.kind() {
            ModuleKind::Plain => {
                if !descriptor.providers().is_empty() || !descriptor.controllers().is_empty() {
                    return Err(ConfigurationError::invalid_module(
                        descriptor.module().path(),
                        "a plain module cannot declare providers or controllers",
                    ));
                }
            }
            ModuleKind::Decorated | ModuleKind::Application => {
                if descriptor.constructor().is_none() {
                    return Err(ConfigurationError::invalid_module(
                        descriptor.module().path(),
                        "a declared module must be constructible",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Install providers, controllers (with their guards, interceptors and
    /// policies) and routers into the module container. Core providers are also
    /// made visible through `overrides`.
    pub fn build_dependencies(&mut self, overrides: &Container) -> Result<(), WeaveError> {
        if self.state >= ModuleState::DependenciesBuilt {
            return Ok(());
        }
        self.require("build_dependencies", ModuleState::Registered)?;
        let span = debug_span!("module", module = %self.name());
        let _guard = span.enter();

        for provider in self.descriptor.providers() {
            provider.register(&self.container)?;
        }
        self.hoist_core_providers(overrides)?;

        let mut routes = Vec::new();
        for controller in self.descriptor.controllers() {
            self.container.add(controller.provider())?;
            for item in controller.cross_cutting() {
                let Some(provider) = item.provider() else {
                    continue;
                };
                if self.container.contains(item.key()) {
                    continue;
                }
                provider.register(&self.container)?;
                debug!(
                    controller = %controller.name(),
                    kind = %item.kind(),
                    provider = %item.key(),
                    "cross-cutting provider registered"
                );
            }
            routes.extend(controller.routes(self.name()));
        }
        for router in self.descriptor.routers() {
            routes.extend(router.routes(self.name()));
        }
        self.routes = routes;

        self.advance(ModuleState::DependenciesBuilt);
        Ok(())
    }

    fn hoist_core_providers(&mut self, overrides: &Container) -> Result<(), WeaveError> {
        if self.core_hoisted {
            return Ok(());
        }
        for provider in self.descriptor.providers().iter().filter(|p| p.is_core()) {
            let source = self.container.clone();
            if !overrides.register_delegate(provider.key(), &source)? {
                warn!(
                    module = %self.name(),
                    provider = %provider.key(),
                    "core provider already registered by another module; keeping the first"
                );
            }
        }
        self.core_hoisted = true;
        Ok(())
    }

    /// Construct the module instance and run its `register_services` hook.
    pub fn register_services(&mut self) -> Result<(), WeaveError> {
        if self.state >= ModuleState::ServicesRegistered {
            return Ok(());
        }
        self.require("register_services", ModuleState::DependenciesBuilt)?;
        let span = debug_span!("module", module = %self.name());
        let _guard = span.enter();

        if let Some(constructor) = self.descriptor.constructor() {
            let init = ModuleInit::new(self.module(), self.name(), &self.container, &self.config);
            let instance =
                constructor(&init).map_err(|e| WeaveError::hook(self.name(), "create", e))?;
            self.container.add(&instance.provider)?;
            instance
                .hooks
                .register_services(&self.container)
                .map_err(|e| WeaveError::hook(self.name(), "register_services", e))?;
            self.instance = Some(instance.hooks);
        }

        self.advance(ModuleState::ServicesRegistered);
        Ok(())
    }

    /// Make this module's exports resolvable from `importer`.
    ///
    /// Every export must be bound in this module's own container, either declared
    /// here or re-exported from one of its dependencies.
    pub fn export_into(&self, importer: &Container) -> Result<usize, WeaveError> {
        self.install_exports(importer, true)
    }

    /// Like [`export_into`](Self::export_into), but skips re-exports whose
    /// source module has not exported them here yet.
    pub fn export_available_into(&self, importer: &Container) -> Result<usize, WeaveError> {
        self.install_exports(importer, false)
    }

    fn install_exports(&self, importer: &Container, strict: bool) -> Result<usize, WeaveError> {
        let mut added = 0;
        for key in self.exports() {
            if !self.container.contains_local(key) {
                if !strict {
                    continue;
                }
                return Err(ConfigurationError::InvalidExport {
                    module: self.name().to_string(),
                    provider: key.to_string(),
                }
                .into());
            }
            if importer.register_delegate(key, &self.container)? {
                added += 1;
            }
        }
        if added > 0 {
            debug!(module = %self.name(), importer = %importer.name(), exports = added, "exports installed");
        }
        Ok(added)
    }

    /// Run the `application_ready` hook. Runs at most once.
    pub fn application_ready(&mut self, app: &Application) -> Result<(), WeaveError> {
        if self.state >= ModuleState::ApplicationReady {
            return Ok(());
        }
        self.require("application_ready", ModuleState::ServicesRegistered)?;
        if let Some(instance) = &self.instance {
            instance
                .application_ready(app)
                .map_err(|e| WeaveError::hook(self.name(), "application_ready", e))?;
        }
        self.advance(ModuleState::ApplicationReady);
        Ok(())
    }

    /// Scope of a provider declared by this module.
    pub fn provider_scope(&self, key: ProviderKey) -> Option<ProviderScope> {
        self.descriptor.provider(key).map(|p| p.scope_kind())
    }
}

impl core::fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleRef")
            .field("module", &self.module())
            .field("state", &self.state)
            .field("container", &self.container.name())
            .field("routes", &self.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::controller::{ControllerDescriptor, CrossCutting, RouterDescriptor};
    use crate::module::Module;
    use weave_core::BindingError;
    use weave_di::{Injectable, ProviderConfig, Resolver};

    static CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Repo;

    struct AuthGuard;

    impl Injectable for AuthGuard {
        fn inject(_: &Resolver<'_>) -> Result<Self, BindingError> {
            Ok(Self)
        }
    }

    struct UsersController {
        _repo: Arc<Repo>,
    }

    impl Injectable for UsersController {
        fn inject(r: &Resolver<'_>) -> Result<Self, BindingError> {
            Ok(Self { _repo: r.get()? })
        }
    }

    struct UsersModule;

    impl Module for UsersModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>()
                .provider(ProviderConfig::value(Repo).export().core())
                .controller(
                    ControllerDescriptor::new::<UsersController>("/users")
                        .get("/", "list")
                        .with(CrossCutting::guard::<AuthGuard>()),
                )
                .router(RouterDescriptor::new("health", "/health").get("/", "ping"))
                .build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Ok(Self)
        }
    }

    struct LeakyModule;

    impl Module for LeakyModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>().export::<Repo>().build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    fn module_ref<M: Module>(overrides: &Arc<Container>) -> ModuleRef {
        let container = Container::new(M::declare().name()).with_overrides(overrides.clone());
        ModuleRef::new(Arc::new(M::declare()), Arc::new(container), Config::default())
    }

    #[test]
    fn lifecycle_moves_forward_and_is_idempotent() {
        let overrides = Arc::new(Container::new("overrides"));
        let mut users = module_ref::<UsersModule>(&overrides);
        assert_eq!(users.state(), ModuleState::Unregistered);

        users.register().unwrap();
        users.build_dependencies(&overrides).unwrap();
        users.build_dependencies(&overrides).unwrap();
        assert_eq!(users.state(), ModuleState::DependenciesBuilt);

        let before = CREATED.load(Ordering::SeqCst);
        users.register_services().unwrap();
        users.register_services().unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), before + 1);
        assert!(users.instance::<UsersModule>().is_some());

        // Core provider hoisted exactly once.
        assert!(overrides.contains_local(ProviderKey::of::<Repo>()));
        assert_eq!(overrides.len(), 1);
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let overrides = Arc::new(Container::new("overrides"));
        let mut users = module_ref::<UsersModule>(&overrides);
        let err = users.register_services().unwrap_err();
        assert!(err.to_string().contains("UsersModule"));
        assert_eq!(users.state(), ModuleState::Unregistered);
    }

    #[test]
    fn controllers_pull_in_their_guards_and_routes() {
        let overrides = Arc::new(Container::new("overrides"));
        let mut users = module_ref::<UsersModule>(&overrides);
        users.register().unwrap();
        users.build_dependencies(&overrides).unwrap();

        assert!(users.container().contains_local(ProviderKey::of::<AuthGuard>()));
        assert!(users.container().get::<UsersController>().is_ok());
        let paths: Vec<&str> = users.routes().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/users", "/health"]);
    }

    #[test]
    fn exports_install_delegates_and_must_be_owned() {
        let overrides = Arc::new(Container::new("overrides"));
        let mut users = module_ref::<UsersModule>(&overrides);
        users.register().unwrap();
        users.build_dependencies(&overrides).unwrap();

        let importer = Container::new("importer");
        assert_eq!(users.export_into(&importer).unwrap(), 1);
        assert_eq!(users.export_into(&importer).unwrap(), 0);
        assert!(importer.get::<Repo>().is_ok());

        let mut leaky = module_ref::<LeakyModule>(&overrides);
        leaky.register().unwrap();
        leaky.build_dependencies(&overrides).unwrap();
        let err = leaky.export_into(&importer).unwrap_err();
        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::InvalidExport { .. })
        ));

        // Not yet bound: skipped rather than rejected.
        let pending = Container::new("pending");
        assert_eq!(leaky.export_available_into(&pending).unwrap(), 0);
        assert!(!pending.contains_local(ProviderKey::of::<Repo>()));
    }
}
