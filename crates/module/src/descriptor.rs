//! Immutable module declarations.

use weave_core::{ConfigurationError, ModuleType, ProviderKey};
use weave_di::ProviderConfig;

use crate::controller::{CommandDescriptor, ControllerDescriptor, RouterDescriptor};
use crate::dynamic::DynamicModule;
use crate::forward_ref::ForwardRefModule;
use crate::module::{Constructor, Module, construct};
use crate::setup::ModuleSetup;

/// Flavour of a module declaration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// A type without module metadata. It can sit in the tree but cannot be
    /// instantiated or patched.
    Plain,
    /// An ordinary declared module.
    Decorated,
    /// The application root. At most one per application.
    Application,
}

/// Where a module declaration comes from.
#[derive(Clone, Copy)]
pub struct ModuleSource {
    module: ModuleType,
    declare: Option<fn() -> ModuleDescriptor>,
}

impl ModuleSource {
    pub fn of<M: Module>() -> Self {
        Self {
            module: ModuleType::of::<M>(),
            declare: Some(M::declare as fn() -> ModuleDescriptor),
        }
    }

    /// A type with no module metadata of its own.
    pub fn plain<T: 'static>() -> Self {
        Self {
            module: ModuleType::of::<T>(),
            declare: Some(ModuleDescriptor::plain::<T> as fn() -> ModuleDescriptor),
        }
    }

    /// A type that is not a module at all. Importing it is a configuration error.
    pub fn undeclared<T: ?Sized + 'static>() -> Self {
        Self {
            module: ModuleType::of::<T>(),
            declare: None,
        }
    }

    pub fn module(&self) -> ModuleType {
        self.module
    }

    pub(crate) fn declare(&self) -> Result<ModuleDescriptor, ConfigurationError> {
        let declare = self.declare.ok_or_else(|| {
            ConfigurationError::not_a_module(self.module.path(), "the type has no module declaration")
        })?;
        let descriptor = declare();
        if descriptor.module() != self.module {
            return Err(ConfigurationError::invalid_module(
                self.module.path(),
                format!("its declaration describes `{}`", descriptor.module().path()),
            ));
        }
        Ok(descriptor)
    }
}

impl core::fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleSource")
            .field("module", &self.module)
            .field("declared", &self.declare.is_some())
            .finish()
    }
}

/// One entry of a module's import list.
#[derive(Debug, Clone)]
pub enum ModuleImport {
    Module(ModuleSource),
    /// Eagerly configured module.
    Dynamic(DynamicModule),
    /// Module configured from resolved dependencies during the build.
    Setup(ModuleSetup),
    /// Module addressed before (or without) being imported directly.
    Forward(ForwardRefModule),
}

impl ModuleImport {
    /// Target module, when known without resolution.
    pub fn module(&self) -> Option<ModuleType> {
        match self {
            ModuleImport::Module(source) => Some(source.module()),
            ModuleImport::Dynamic(dynamic) => Some(dynamic.module()),
            ModuleImport::Setup(setup) => Some(setup.module()),
            ModuleImport::Forward(forward) => forward.resolved(),
        }
    }
}

impl From<DynamicModule> for ModuleImport {
    fn from(value: DynamicModule) -> Self {
        ModuleImport::Dynamic(value)
    }
}

impl From<ModuleSetup> for ModuleImport {
    fn from(value: ModuleSetup) -> Self {
        ModuleImport::Setup(value)
    }
}

impl From<ForwardRefModule> for ModuleImport {
    fn from(value: ForwardRefModule) -> Self {
        ModuleImport::Forward(value)
    }
}

impl From<ModuleSource> for ModuleImport {
    fn from(value: ModuleSource) -> Self {
        ModuleImport::Module(value)
    }
}

/// Everything the module graph knows about one module.
///
/// Built once by [`Module::declare`] and never mutated; dynamic configuration
/// produces a new, patched descriptor (see [`ModuleCatalog`](crate::ModuleCatalog)).
#[derive(Clone)]
pub struct ModuleDescriptor {
    module: ModuleType,
    name: String,
    kind: ModuleKind,
    providers: Vec<ProviderConfig>,
    controllers: Vec<ControllerDescriptor>,
    routers: Vec<RouterDescriptor>,
    imports: Vec<ModuleImport>,
    exports: Vec<ProviderKey>,
    commands: Vec<CommandDescriptor>,
    constructor: Option<Constructor>,
}

impl ModuleDescriptor {
    pub fn builder<M: Module>() -> ModuleBuilder {
        ModuleBuilder::new::<M>(ModuleKind::Decorated)
    }

    /// Declare the application root module.
    pub fn application<M: Module>() -> ModuleBuilder {
        ModuleBuilder::new::<M>(ModuleKind::Application)
    }

    pub fn plain<T: 'static>() -> Self {
        let module = ModuleType::of::<T>();
        Self {
            module,
            name: module.name().to_string(),
            kind: ModuleKind::Plain,
            providers: Vec::new(),
            controllers: Vec::new(),
            routers: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            commands: Vec::new(),
            constructor: None,
        }
    }

    pub fn module(&self) -> ModuleType {
        self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn provider(&self, key: ProviderKey) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.key() == key)
    }

    pub fn controllers(&self) -> &[ControllerDescriptor] {
        &self.controllers
    }

    pub fn routers(&self) -> &[RouterDescriptor] {
        &self.routers
    }

    pub fn imports(&self) -> &[ModuleImport] {
        &self.imports
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Explicit exports plus every provider flagged `export`, in declaration order.
    pub fn exports(&self) -> Vec<ProviderKey> {
        let mut keys = self.exports.clone();
        for provider in self.providers.iter().filter(|p| p.is_exported()) {
            if !keys.contains(&provider.key()) {
                keys.push(provider.key());
            }
        }
        keys
    }

    pub(crate) fn constructor(&self) -> Option<Constructor> {
        self.constructor
    }

    /// A copy of this descriptor with `patch` merged in.
    ///
    /// Providers replace same-keyed providers; controllers, routers and commands
    /// are appended; exports are unioned.
    pub(crate) fn patched(&self, patch: &DynamicModule) -> Self {
        let mut next = self.clone();
        for provider in patch.providers() {
            match next.providers.iter_mut().find(|p| p.key() == provider.key()) {
                Some(existing) => *existing = provider.clone(),
                None => next.providers.push(provider.clone()),
            }
        }
        next.controllers.extend(patch.controllers().iter().cloned());
        next.routers.extend(patch.routers().iter().cloned());
        next.commands.extend(patch.commands().iter().cloned());
        for key in patch.exports() {
            if !next.exports.contains(key) {
                next.exports.push(*key);
            }
        }
        next
    }

    pub(crate) fn with_import(mut self, import: ModuleImport) -> Self {
        self.imports.push(import);
        self
    }
}

impl core::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("module", &self.module)
            .field("kind", &self.kind)
            .field("providers", &self.providers.len())
            .field("controllers", &self.controllers.len())
            .field("routers", &self.routers.len())
            .field("imports", &self.imports)
            .field("exports", &self.exports())
            .finish()
    }
}

/// Builder returned by [`ModuleDescriptor::builder`] and [`ModuleDescriptor::application`].
pub struct ModuleBuilder {
    descriptor: ModuleDescriptor,
}

impl ModuleBuilder {
    fn new<M: Module>(kind: ModuleKind) -> Self {
        let mut descriptor = ModuleDescriptor::plain::<M>();
        descriptor.kind = kind;
        descriptor.constructor = Some(construct::<M> as Constructor);
        Self { descriptor }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }

    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.descriptor.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = ProviderConfig>) -> Self {
        self.descriptor.providers.extend(providers);
        self
    }

    pub fn controller(mut self, controller: ControllerDescriptor) -> Self {
        self.descriptor.controllers.push(controller);
        self
    }

    pub fn router(mut self, router: RouterDescriptor) -> Self {
        self.descriptor.routers.push(router);
        self
    }

    pub fn import<M: Module>(self) -> Self {
        self.import_from(ModuleSource::of::<M>())
    }

    /// Import a dynamic module, a module setup, a forward reference or a source.
    pub fn import_from(mut self, import: impl Into<ModuleImport>) -> Self {
        self.descriptor.imports.push(import.into());
        self
    }

    pub fn export<T: ?Sized + 'static>(mut self) -> Self {
        let key = ProviderKey::of::<T>();
        if !self.descriptor.exports.contains(&key) {
            self.descriptor.exports.push(key);
        }
        self
    }

    pub fn command(mut self, command: CommandDescriptor) -> Self {
        self.descriptor.commands.push(command);
        self
    }

    pub fn build(self) -> ModuleDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleInit;

    struct Settings;
    struct Cache;

    struct CacheModule;

    impl Module for CacheModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>()
                .provider(ProviderConfig::value(Settings))
                .provider(ProviderConfig::value(Cache).export())
                .export::<Settings>()
                .build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    struct Mislabelled;

    impl Module for Mislabelled {
        fn declare() -> ModuleDescriptor {
            CacheModule::declare()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn exports_union_explicit_and_flagged_providers() {
        let descriptor = CacheModule::declare();
        assert_eq!(
            descriptor.exports(),
            vec![ProviderKey::of::<Settings>(), ProviderKey::of::<Cache>()]
        );
        assert_eq!(descriptor.name(), "CacheModule");
        assert_eq!(descriptor.kind(), ModuleKind::Decorated);
    }

    #[test]
    fn undeclared_sources_are_not_modules() {
        let err = ModuleSource::undeclared::<String>().declare().unwrap_err();
        assert!(matches!(err, ConfigurationError::NotAModule { .. }));
        assert!(err.to_string().contains("String"));
    }

    #[test]
    fn declarations_must_describe_their_own_type() {
        let err = ModuleSource::of::<Mislabelled>().declare().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidModuleType { ref module, .. } if module.ends_with("Mislabelled")));
    }

    #[test]
    fn plain_sources_declare_empty_plain_modules() {
        let descriptor = ModuleSource::plain::<Settings>().declare().unwrap();
        assert_eq!(descriptor.kind(), ModuleKind::Plain);
        assert!(descriptor.constructor().is_none());
    }
}
