//! The injector root: builds a whole application from its root module.
//!
//! The build runs in phases:
//!
//! 1. Walk the import graph from the core module, declaring every module and
//!    adding a placeholder for it to the module tree. Dynamic modules are applied
//!    as they are encountered.
//! 2. Resolve every forward reference against the populated tree.
//! 3. In registration order, give every module a container and finalize its
//!    placeholder into a [`ModuleRef`] (running module setups that do not need
//!    the application). A finalized module exports into its importers right
//!    away, so a setup sees the exports of the imports declared before it.
//! 4. Register services, dependencies first.
//! 5. Create the [`Application`].
//! 6. Finalize module setups that depend on the application, dependencies
//!    first, then check every export is bound.
//! 7. Freeze every container.
//! 8. Run `application_ready` on every module, once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use weave_core::{BindingError, ConfigurationError, ModuleType, TreeError, WeaveResult};
use weave_di::{Container, RequestScope};

use crate::application::Application;
use crate::catalog::ModuleCatalog;
use crate::config::Config;
use crate::controller::{CommandDescriptor, Route};
use crate::descriptor::{ModuleDescriptor, ModuleImport, ModuleKind, ModuleSource};
use crate::forward_ref::ForwardRefModule;
use crate::module::{Module, ModuleInit};
use crate::module_ref::{ModuleRef, ModuleState};
use crate::setup::{Injected, Injection, ModuleSetup, SetupContext};
use crate::tree::{Edge, ModuleTreeManager};

/// Value stored in the module tree for each module.
#[derive(Debug)]
pub enum ModuleEntry {
    /// Declared but not yet finalized.
    Pending {
        descriptor: Arc<ModuleDescriptor>,
        setup: Option<ModuleSetup>,
    },
    Ready(ModuleRef),
}

impl ModuleEntry {
    pub fn name(&self) -> &str {
        match self {
            ModuleEntry::Pending { descriptor, .. } => descriptor.name(),
            ModuleEntry::Ready(module_ref) => module_ref.name(),
        }
    }

    pub fn descriptor(&self) -> &Arc<ModuleDescriptor> {
        match self {
            ModuleEntry::Pending { descriptor, .. } => descriptor,
            ModuleEntry::Ready(module_ref) => module_ref.descriptor(),
        }
    }

    pub fn module_ref(&self) -> Option<&ModuleRef> {
        match self {
            ModuleEntry::Ready(module_ref) => Some(module_ref),
            ModuleEntry::Pending { .. } => None,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.module_ref()
            .map_or(ModuleState::Unregistered, ModuleRef::state)
    }
}

/// Root of every module tree. Its container is the application's root container.
pub struct CoreModule;

impl Module for CoreModule {
    fn declare() -> ModuleDescriptor {
        ModuleDescriptor::builder::<Self>().build()
    }

    fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

/// A built application and the module graph behind it.
pub struct AppInjector {
    catalog: ModuleCatalog,
    tree: ModuleTreeManager<ModuleEntry>,
    root_module: ModuleType,
    overrides: Arc<Container>,
    application: Arc<Application>,
    lifecycle_order: Vec<ModuleType>,
}

impl AppInjector {
    /// Build an application rooted at `M`, named after the module.
    pub fn build<M: Module>(config: Config) -> WeaveResult<Self> {
        let name = M::declare().name().to_string();
        Self::build_named::<M>(name, config)
    }

    pub fn build_named<M: Module>(name: impl Into<String>, config: Config) -> WeaveResult<Self> {
        Self::build_from(ModuleSource::of::<M>(), name.into(), config)
    }

    /// Build from a module source, which may fail to declare a module at all.
    pub fn build_from(source: ModuleSource, name: String, config: Config) -> WeaveResult<Self> {
        info!(application = %name, root = %source.module(), "building application");

        let mut build = Build::new(source, config)?;
        build.declare_modules()?;
        build.resolve_forward_refs()?;
        build.construct_module_refs()?;
        build.register_all_services()?;

        let root = build.container_of(build.core)?;
        let application = Arc::new(Application::new(name, root.clone(), build.config.clone()));
        root.register_instance(application.info().clone())?;

        build.finalize_deferred(&application)?;
        build.validate_exports()?;
        build.freeze();
        build.application_ready(&application)?;

        info!(
            application = %application.name(),
            application_id = %application.id(),
            modules = build.tree.len(),
            "application ready"
        );

        Ok(Self {
            catalog: build.catalog,
            tree: build.tree,
            root_module: build.root_module,
            overrides: build.overrides,
            application,
            lifecycle_order: build.lifecycle_order,
        })
    }

    pub fn application(&self) -> &Arc<Application> {
        &self.application
    }

    /// The root container.
    pub fn container(&self) -> &Arc<Container> {
        self.application.container()
    }

    /// The container holding delegates for every core provider.
    pub fn overrides(&self) -> &Arc<Container> {
        &self.overrides
    }

    pub fn config(&self) -> &Config {
        self.application.config()
    }

    pub fn tree(&self) -> &ModuleTreeManager<ModuleEntry> {
        &self.tree
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn core_module(&self) -> ModuleType {
        ModuleType::of::<CoreModule>()
    }

    pub fn root_module(&self) -> ModuleType {
        self.root_module
    }

    /// Modules in the order their services were registered (dependencies first).
    pub fn lifecycle_order(&self) -> &[ModuleType] {
        &self.lifecycle_order
    }

    pub fn get_module_ref(&self, module: ModuleType) -> Option<&ModuleRef> {
        self.tree.get_module(module)?.value().module_ref()
    }

    pub fn get_module_ref_of<M: 'static>(&self) -> Option<&ModuleRef> {
        self.get_module_ref(ModuleType::of::<M>())
    }

    pub fn get_module_ref_by_name(&self, name: &str) -> Option<&ModuleRef> {
        self.tree
            .find_module(|_, node| node.value().name() == name)
            .find_map(|(_, node)| node.value().module_ref())
    }

    pub fn module_state(&self, module: ModuleType) -> Option<ModuleState> {
        self.tree.get_module(module).map(|node| node.value().state())
    }

    /// Every route of every module, in depth-first tree order from the core module.
    pub fn get_routes(&self) -> Vec<Route> {
        self.routes_of(self.core_module(), true)
    }

    /// Routes of `module`, optionally followed by those of every module it depends on.
    pub fn routes_of(&self, module: ModuleType, with_dependencies: bool) -> Vec<Route> {
        let modules = if with_dependencies {
            self.tree.dfs_order(module)
        } else {
            vec![module]
        };
        modules
            .into_iter()
            .filter_map(|module| self.get_module_ref(module))
            .flat_map(|module_ref| module_ref.routes().iter().cloned())
            .collect()
    }

    pub fn commands(&self) -> Vec<CommandDescriptor> {
        self.tree
            .dfs_order(self.core_module())
            .into_iter()
            .filter_map(|module| self.get_module_ref(module))
            .flat_map(|module_ref| module_ref.commands().iter().cloned())
            .collect()
    }

    /// Resolve `T` from the root container.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        self.application.get::<T>()
    }

    /// Open a request scope over the container of `module`.
    pub fn create_request_scope(&self, module: ModuleType) -> Option<RequestScope> {
        self.get_module_ref(module)
            .map(|module_ref| RequestScope::new(module_ref.container().clone()))
    }
}

impl core::fmt::Debug for AppInjector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppInjector")
            .field("application", &self.application)
            .field("root_module", &self.root_module)
            .field("modules", &self.tree.len())
            .finish()
    }
}

/// Mutable state of one application build.
struct Build {
    catalog: ModuleCatalog,
    tree: ModuleTreeManager<ModuleEntry>,
    core: ModuleType,
    root_module: ModuleType,
    root_name: String,
    config: Config,
    overrides: Arc<Container>,
    containers: HashMap<ModuleType, Arc<Container>>,
    forward_refs: Vec<(ModuleType, ForwardRefModule)>,
    deferred: HashSet<ModuleType>,
    lifecycle_order: Vec<ModuleType>,
}

impl Build {
    fn new(source: ModuleSource, config: Config) -> WeaveResult<Self> {
        let mut catalog = ModuleCatalog::new();
        let root = catalog.declare(&source)?;
        let core = catalog.insert(CoreModule::declare().with_import(ModuleImport::Module(source)));

        let mut tree = ModuleTreeManager::new();
        tree.add_module(
            core.module(),
            ModuleEntry::Pending {
                descriptor: core.clone(),
                setup: None,
            },
            None,
        )?;

        Ok(Self {
            catalog,
            tree,
            core: core.module(),
            root_module: root.module(),
            root_name: root.name().to_string(),
            config,
            overrides: Arc::new(Container::new("overrides")),
            containers: HashMap::new(),
            forward_refs: Vec::new(),
            deferred: HashSet::new(),
            lifecycle_order: Vec::new(),
        })
    }

    fn name_of(&self, module: ModuleType) -> String {
        self.tree
            .get_module(module)
            .map_or_else(|| module.name().to_string(), |n| n.value().name().to_string())
    }

    fn container_of(&self, module: ModuleType) -> Result<Arc<Container>, TreeError> {
        self.containers
            .get(&module)
            .cloned()
            .ok_or_else(|| TreeError::NotRegistered {
                module: module.path().to_string(),
            })
    }

    fn module_ref(&self, module: ModuleType) -> Option<&ModuleRef> {
        self.tree.get_module(module).and_then(|n| n.value().module_ref())
    }

    /// Resolved dependency targets of `module`, in declaration order.
    fn dependencies_of(&self, module: ModuleType) -> Vec<ModuleType> {
        self.tree
            .get_module(module)
            .map(|n| n.dependencies().iter().filter_map(Edge::target).collect())
            .unwrap_or_default()
    }

    // Phase 1

    fn declare_modules(&mut self) -> WeaveResult<()> {
        let core = self.tree.get_module(self.core).map(|n| n.value().descriptor().clone());
        if let Some(core) = core {
            for import in core.imports() {
                self.declare_import(self.core, import)?;
            }
        }

        let count = self
            .tree
            .get_module(self.core)
            .map_or(0, |n| n.dependencies().len());
        if count > 1 {
            return Err(ConfigurationError::CoreModuleDependencies { count }.into());
        }
        info!(modules = self.tree.len(), "module tree declared");
        Ok(())
    }

    fn declare_import(&mut self, parent: ModuleType, import: &ModuleImport) -> WeaveResult<()> {
        match import {
            ModuleImport::Module(source) => {
                let descriptor = self.catalog.declare(source)?;
                self.attach(parent, descriptor, None)
            }
            ModuleImport::Dynamic(dynamic) => {
                self.catalog.declare(dynamic.source())?;
                dynamic.apply_configuration(&mut self.catalog)?;
                let descriptor = self.catalog.get(dynamic.module()).ok_or_else(|| {
                    ConfigurationError::not_a_module(dynamic.module().path(), "the module is not declared")
                })?;
                self.attach(parent, descriptor, None)
            }
            ModuleImport::Setup(setup) => {
                let descriptor = self.catalog.declare(setup.source())?;
                if descriptor.kind() == ModuleKind::Plain {
                    return Err(ConfigurationError::not_a_module(
                        setup.module().path(),
                        "module setups need a declared module",
                    )
                    .into());
                }
                self.attach(parent, descriptor, Some(setup.clone()))
            }
            ModuleImport::Forward(forward) => {
                self.tree.add_dependency(parent, Edge::Forward(forward.clone()))?;
                self.forward_refs.push((parent, forward.clone()));
                Ok(())
            }
        }
    }

    fn attach(
        &mut self,
        parent: ModuleType,
        descriptor: Arc<ModuleDescriptor>,
        setup: Option<ModuleSetup>,
    ) -> WeaveResult<()> {
        let module = descriptor.module();
        let is_root = parent == self.core && module == self.root_module;
        if descriptor.kind() == ModuleKind::Application && !is_root {
            return Err(ConfigurationError::MultipleApplicationModules {
                existing: self.root_name.clone(),
                found: descriptor.name().to_string(),
            }
            .into());
        }

        if self.tree.contains(module) {
            if setup.is_some() {
                warn!(module = %descriptor.name(), "module already registered; ignoring its setup");
            }
            self.tree.add_dependency(parent, Edge::Module(module))?;
            return Ok(());
        }

        self.tree.add_module(
            module,
            ModuleEntry::Pending {
                descriptor: descriptor.clone(),
                setup,
            },
            Some(parent),
        )?;
        self.tree.add_dependency(parent, Edge::Module(module))?;
        debug!(module = %descriptor.name(), parent = %parent, "module registered in tree");

        for import in descriptor.imports() {
            self.declare_import(module, import)?;
        }
        Ok(())
    }

    // Phase 2

    fn resolve_forward_refs(&mut self) -> WeaveResult<()> {
        let candidates: Vec<(ModuleType, String)> = self
            .tree
            .iter()
            .map(|(module, node)| (module, node.value().name().to_string()))
            .collect();

        for (declaring, forward) in std::mem::take(&mut self.forward_refs) {
            let name = self.name_of(declaring);
            let target = forward.resolve(
                &name,
                candidates.iter().map(|(module, name)| (*module, name.as_str())),
            )?;
            self.tree.add_forward_ref(&forward)?;
            debug!(module = %name, target = %target, "forward reference resolved");
        }
        Ok(())
    }

    // Phase 3

    fn construct_module_refs(&mut self) -> WeaveResult<()> {
        for module in self.tree.modules().to_vec() {
            let Some(node) = self.tree.get_module(module) else {
                continue;
            };
            let name = node.value().name().to_string();
            let setup = match node.value() {
                ModuleEntry::Pending { setup, .. } => setup.clone(),
                ModuleEntry::Ready(_) => continue,
            };

            let container = match node.parent() {
                Some(parent) => Container::child(name, self.container_of(parent)?),
                None => {
                    let root = Container::new(name).with_overrides(self.overrides.clone());
                    root.register_instance(self.config.clone())?;
                    root
                }
            };
            self.containers.insert(module, Arc::new(container));

            match setup {
                Some(setup) if setup.is_app_dependent() => {
                    self.deferred.insert(module);
                }
                Some(setup) => {
                    self.run_setup(module, &setup, None)?;
                    self.finalize(module)?;
                }
                None => self.finalize(module)?,
            }
        }
        Ok(())
    }

    fn run_setup(
        &mut self,
        module: ModuleType,
        setup: &ModuleSetup,
        application: Option<&Arc<Application>>,
    ) -> WeaveResult<()> {
        let name = self.name_of(module);
        let parent = self.tree.get_module(module).and_then(|n| n.parent());
        let source = self.container_of(parent.unwrap_or(module))?;

        let mut values = Vec::new();
        for injection in setup.injections() {
            if let Injection::Provider(key) = injection {
                let instance = source
                    .get_instance(*key)
                    .map_err(|e| ConfigurationError::setup_failed(name.as_str(), e))?;
                values.push((*key, instance));
            }
        }
        let injected = Injected::new(values, application.cloned());
        let ctx = SetupContext::new(module, setup.init_kwargs(), &self.config);

        let dynamic = setup.build(&ctx, &injected)?;
        dynamic.apply_configuration(&mut self.catalog)?;
        debug!(module = %name, dependencies = injected.len(), "module setup applied");
        Ok(())
    }

    fn finalize(&mut self, module: ModuleType) -> WeaveResult<()> {
        let descriptor = self.catalog.get(module).ok_or_else(|| {
            ConfigurationError::not_a_module(module.path(), "the module is not declared")
        })?;
        let mut module_ref = ModuleRef::new(descriptor, self.container_of(module)?, self.config.clone());
        module_ref.register()?;
        module_ref.build_dependencies(&self.overrides)?;
        self.tree.update_module(module, ModuleEntry::Ready(module_ref), None)?;
        self.pull_exports(module)?;
        self.push_exports(module)
    }

    /// Install the exports of every finalized dependency into `module`'s container.
    fn pull_exports(&self, module: ModuleType) -> WeaveResult<()> {
        let container = self.container_of(module)?;
        for dependency in self.dependencies_of(module) {
            if let Some(dependency_ref) = self.module_ref(dependency) {
                dependency_ref.export_available_into(&container)?;
            }
        }
        Ok(())
    }

    /// Install the exports of `module` into every importer that has a container.
    /// An importer that received something new passes on what it re-exports.
    fn push_exports(&self, module: ModuleType) -> WeaveResult<()> {
        let Some(module_ref) = self.module_ref(module) else {
            return Ok(());
        };
        for importer in self.tree.dependents_of(module) {
            let Some(container) = self.containers.get(&importer) else {
                continue;
            };
            if module_ref.export_available_into(container)? > 0 {
                self.push_exports(importer)?;
            }
        }
        Ok(())
    }

    // Phase 4

    fn register_all_services(&mut self) -> WeaveResult<()> {
        let mut visited = HashSet::new();
        self.register_services(self.core, &mut visited)?;
        info!(modules = self.lifecycle_order.len(), "services registered");
        Ok(())
    }

    /// Dependencies (in reverse insertion order) before the module itself.
    fn register_services(&mut self, module: ModuleType, visited: &mut HashSet<ModuleType>) -> WeaveResult<()> {
        if !visited.insert(module) {
            return Ok(());
        }
        for dependency in self.dependencies_of(module).into_iter().rev() {
            self.register_services(dependency, visited)?;
        }
        self.finish_module(module)
    }

    fn finish_module(&mut self, module: ModuleType) -> WeaveResult<()> {
        let Some(node) = self.tree.get_module_mut(module) else {
            return Ok(());
        };
        let ModuleEntry::Ready(module_ref) = node.value_mut() else {
            // Waiting for the application.
            return Ok(());
        };
        module_ref.register_services()?;
        self.lifecycle_order.push(module);
        Ok(())
    }

    // Phase 6

    fn finalize_deferred(&mut self, application: &Arc<Application>) -> WeaveResult<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        let deferred = std::mem::take(&mut self.deferred);
        let mut visited = HashSet::new();
        self.finalize_deferred_from(self.core, &deferred, &mut visited, application)?;
        info!(modules = deferred.len(), "application-dependent modules finalized");
        Ok(())
    }

    /// Dependencies (in declaration order) before the module itself, so a
    /// deferred module sees the exports of the deferred modules it imports.
    fn finalize_deferred_from(
        &mut self,
        module: ModuleType,
        deferred: &HashSet<ModuleType>,
        visited: &mut HashSet<ModuleType>,
        application: &Arc<Application>,
    ) -> WeaveResult<()> {
        if !visited.insert(module) {
            return Ok(());
        }
        for dependency in self.dependencies_of(module) {
            self.finalize_deferred_from(dependency, deferred, visited, application)?;
        }
        if !deferred.contains(&module) {
            return Ok(());
        }
        let setup = match self.tree.get_module(module).map(|n| n.value()) {
            Some(ModuleEntry::Pending { setup: Some(setup), .. }) => setup.clone(),
            _ => return Ok(()),
        };
        self.run_setup(module, &setup, Some(application))?;
        self.finalize(module)?;
        self.finish_module(module)
    }

    /// Every export must be bound in its module's container once all modules exist.
    fn validate_exports(&self) -> WeaveResult<()> {
        for (module, node) in self.tree.iter() {
            let Some(module_ref) = node.value().module_ref() else {
                continue;
            };
            for importer in self.tree.dependents_of(module) {
                module_ref.export_into(&*self.container_of(importer)?)?;
            }
        }
        Ok(())
    }

    // Phase 7

    fn freeze(&self) {
        self.overrides.freeze();
        for container in self.containers.values() {
            container.freeze();
        }
    }

    // Phase 8

    fn application_ready(&mut self, application: &Application) -> WeaveResult<()> {
        for module in self.lifecycle_order.clone() {
            if let Some(ModuleEntry::Ready(module_ref)) =
                self.tree.get_module_mut(module).map(|n| n.value_mut())
            {
                module_ref.application_ready(application)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dynamic::DynamicModule;
    use weave_di::ProviderConfig;

    struct Clock;
    struct Mailer(String);

    struct MailModule;

    impl Module for MailModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>().build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    struct ClockModule;

    impl Module for ClockModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>()
                .provider(ProviderConfig::value(Clock).export())
                .build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    static READY: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    struct RootModule;

    impl Module for RootModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::application::<Self>()
                .import::<ClockModule>()
                .import_from(
                    ModuleSetup::new::<MailModule, _>(|_, deps| {
                        let app = deps.application()?;
                        Ok(DynamicModule::new::<MailModule>()
                            .provider(ProviderConfig::value(Mailer(app.name().to_string())).export()))
                    })
                    .inject_application(),
                )
                .build()
        }

        fn create(init: &ModuleInit<'_>) -> anyhow::Result<Self> {
            init.get::<Clock>()?;
            Ok(Self)
        }

        fn application_ready(&self, _: &Application) -> anyhow::Result<()> {
            READY.lock().unwrap().push("root");
            Ok(())
        }
    }

    #[test]
    fn builds_the_tree_under_the_core_module() {
        let injector = AppInjector::build_named::<RootModule>("demo", Config::default()).unwrap();
        let tree = injector.tree();

        let core = tree.get_module(injector.core_module()).unwrap();
        assert_eq!(core.dependencies(), &[Edge::Module(ModuleType::of::<RootModule>())]);
        assert_eq!(
            tree.get_module(ModuleType::of::<ClockModule>()).unwrap().parent(),
            Some(ModuleType::of::<RootModule>())
        );
        assert_eq!(injector.application().name(), "demo");
        assert!(injector.get::<Config>().is_ok());
    }

    #[test]
    fn application_dependent_setups_run_after_services() {
        let injector = AppInjector::build_named::<RootModule>("mailer-app", Config::default()).unwrap();

        let order = injector.lifecycle_order();
        assert_eq!(order.last(), Some(&ModuleType::of::<MailModule>()));
        let mail = injector.get_module_ref_of::<MailModule>().unwrap();
        assert_eq!(mail.container().get::<Mailer>().unwrap().0, "mailer-app");
        assert_eq!(mail.state(), ModuleState::ApplicationReady);
        assert!(READY.lock().unwrap().contains(&"root"));
    }

    #[test]
    fn every_container_is_frozen_after_build() {
        let injector = AppInjector::build::<RootModule>(Config::default()).unwrap();
        for module in injector.tree().modules() {
            let module_ref = injector.get_module_ref(*module).unwrap();
            assert!(module_ref.container().is_frozen(), "{} not frozen", module_ref.name());
        }
        assert!(injector.overrides().is_frozen());
    }

    #[test]
    fn undeclared_roots_are_rejected() {
        let err = AppInjector::build_from(
            ModuleSource::undeclared::<Clock>(),
            "broken".into(),
            Config::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.as_configuration(),
            Some(ConfigurationError::NotAModule { .. })
        ));
    }
}
