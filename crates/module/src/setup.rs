//! Deferred module configuration from resolved dependencies.

use std::sync::Arc;

use serde_json::{Map, Value};
use weave_core::{ConfigurationError, ModuleType, ProviderKey, WeaveError};
use weave_di::Instance;
use weave_di::provider::unerase;

use crate::application::Application;
use crate::config::Config;
use crate::descriptor::ModuleSource;
use crate::dynamic::DynamicModule;
use crate::module::Module;

/// A dependency a setup factory asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// A provider resolved from the importing module's container.
    Provider(ProviderKey),
    /// The live [`Application`]. Setups asking for it run after every other module
    /// has registered its services.
    Application,
}

type SetupFactory =
    Arc<dyn Fn(&SetupContext<'_>, &Injected) -> anyhow::Result<DynamicModule> + Send + Sync>;

/// Configure a module from values that only exist once the graph is partly built.
///
/// ```ignore
/// let setup = ModuleSetup::new::<MailModule, _>(|ctx, deps| {
///     let config = deps.get::<Config>()?;
///     Ok(DynamicModule::new::<MailModule>()
///         .provider(ProviderConfig::value(Mailer::from_config(&config)?).export()))
/// })
/// .inject::<Config>();
/// ```
#[derive(Clone)]
pub struct ModuleSetup {
    source: ModuleSource,
    inject: Vec<Injection>,
    init_kwargs: Map<String, Value>,
    factory: SetupFactory,
}

impl ModuleSetup {
    pub fn new<M, F>(factory: F) -> Self
    where
        M: Module,
        F: Fn(&SetupContext<'_>, &Injected) -> anyhow::Result<DynamicModule> + Send + Sync + 'static,
    {
        Self {
            source: ModuleSource::of::<M>(),
            inject: Vec::new(),
            init_kwargs: Map::new(),
            factory: Arc::new(factory),
        }
    }

    /// Resolve `T` from the importing module's container before running the factory.
    pub fn inject<T: ?Sized + 'static>(mut self) -> Self {
        self.inject.push(Injection::Provider(ProviderKey::of::<T>()));
        self
    }

    pub fn inject_application(mut self) -> Self {
        self.inject.push(Injection::Application);
        self
    }

    /// Static argument forwarded to the factory through [`SetupContext::kwarg`].
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.init_kwargs.insert(key.into(), value.into());
        self
    }

    pub fn module(&self) -> ModuleType {
        self.source.module()
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    pub fn injections(&self) -> &[Injection] {
        &self.inject
    }

    pub fn init_kwargs(&self) -> &Map<String, Value> {
        &self.init_kwargs
    }

    pub fn is_app_dependent(&self) -> bool {
        self.inject.contains(&Injection::Application)
    }

    /// Run the factory and check that it configures the module this setup targets.
    pub(crate) fn build(
        &self,
        ctx: &SetupContext<'_>,
        injected: &Injected,
    ) -> Result<DynamicModule, WeaveError> {
        let module = self.module();
        let dynamic = (self.factory)(ctx, injected)
            .map_err(|e| WeaveError::hook(module.name(), "module setup", e))?;
        if dynamic.module() != module {
            return Err(ConfigurationError::invalid_dynamic_module(
                module.path(),
                format!("the setup factory configured `{}` instead", dynamic.module().path()),
            )
            .into());
        }
        Ok(dynamic)
    }
}

impl core::fmt::Debug for ModuleSetup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleSetup")
            .field("module", &self.module())
            .field("inject", &self.inject)
            .field("init_kwargs", &self.init_kwargs)
            .finish()
    }
}

/// Static inputs of a setup factory.
pub struct SetupContext<'a> {
    module: ModuleType,
    init_kwargs: &'a Map<String, Value>,
    config: &'a Config,
}

impl<'a> SetupContext<'a> {
    pub(crate) fn new(module: ModuleType, init_kwargs: &'a Map<String, Value>, config: &'a Config) -> Self {
        Self {
            module,
            init_kwargs,
            config,
        }
    }

    pub fn module(&self) -> ModuleType {
        self.module
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.init_kwargs.get(key)
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        self.init_kwargs
    }

    pub fn config(&self) -> &Config {
        self.config
    }
}

/// Dependencies resolved for a setup factory, in declaration order.
#[derive(Default)]
pub struct Injected {
    values: Vec<(ProviderKey, Instance)>,
    application: Option<Arc<Application>>,
}

impl Injected {
    pub(crate) fn new(values: Vec<(ProviderKey, Instance)>, application: Option<Arc<Application>>) -> Self {
        Self { values, application }
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> anyhow::Result<Arc<T>> {
        let key = ProviderKey::of::<T>();
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, instance)| unerase::<T>(instance))
            .ok_or_else(|| anyhow::anyhow!("`{key}` was not declared as a setup dependency"))
    }

    pub fn application(&self) -> anyhow::Result<&Arc<Application>> {
        self.application
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("the application was not declared as a setup dependency"))
    }

    pub fn len(&self) -> usize {
        self.values.len() + usize::from(self.application.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModuleDescriptor;
    use crate::module::ModuleInit;
    use weave_di::ProviderConfig;

    struct MailModule;
    struct OtherModule;

    impl Module for MailModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>().build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    impl Module for OtherModule {
        fn declare() -> ModuleDescriptor {
            ModuleDescriptor::builder::<Self>().build()
        }

        fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    struct Sender(String);

    #[test]
    fn application_marker_makes_a_setup_app_dependent() {
        let plain = ModuleSetup::new::<MailModule, _>(|_, _| Ok(DynamicModule::new::<MailModule>()))
            .inject::<Config>();
        assert!(!plain.is_app_dependent());

        let deferred = plain.clone().inject_application();
        assert!(deferred.is_app_dependent());
        assert_eq!(
            deferred.injections(),
            &[Injection::Provider(ProviderKey::of::<Config>()), Injection::Application]
        );
    }

    #[test]
    fn factory_sees_kwargs_and_injected_values() {
        let setup = ModuleSetup::new::<MailModule, _>(|ctx, deps| {
            let prefix = ctx.kwarg("prefix").and_then(Value::as_str).unwrap_or_default();
            let sender = deps.get::<Sender>()?;
            Ok(DynamicModule::new::<MailModule>()
                .provider(ProviderConfig::value(Sender(format!("{prefix}{}", sender.0)))))
        })
        .inject::<Sender>()
        .kwarg("prefix", "noreply@");

        let injected = Injected::new(
            vec![(
                ProviderKey::of::<Sender>(),
                Arc::new(Arc::new(Sender("example.com".into()))) as Instance,
            )],
            None,
        );
        let config = Config::default();
        let ctx = SetupContext::new(setup.module(), setup.init_kwargs(), &config);

        let dynamic = setup.build(&ctx, &injected).unwrap();
        assert_eq!(dynamic.providers().len(), 1);
        assert!(injected.application().is_err());
    }

    #[test]
    fn factory_configuring_another_module_is_rejected() {
        let setup = ModuleSetup::new::<MailModule, _>(|_, _| Ok(DynamicModule::new::<OtherModule>()));
        let config = Config::default();
        let ctx = SetupContext::new(setup.module(), setup.init_kwargs(), &config);

        let err = setup.build(&ctx, &Injected::default()).unwrap_err();
        match err.as_configuration() {
            Some(ConfigurationError::InvalidDynamicModule { module, .. }) => {
                assert!(module.ends_with("MailModule"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn factory_errors_are_reported_as_hook_failures() {
        let setup = ModuleSetup::new::<MailModule, _>(|_, _| anyhow::bail!("smtp host missing"));
        let config = Config::default();
        let ctx = SetupContext::new(setup.module(), setup.init_kwargs(), &config);

        let err = setup.build(&ctx, &Injected::default()).unwrap_err();
        assert!(err.to_string().contains("smtp host missing"));
        assert!(err.to_string().contains("MailModule"));
    }
}
