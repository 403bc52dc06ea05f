//! Process entry point: load configuration, initialize logging, build the application.

use tracing::info_span;
use weave_core::WeaveResult;
use weave_module::{AppInjector, Module};

use crate::config::{AppSettings, ConfigLoader, LoadedConfig};

/// A built application together with the settings it was built from.
#[derive(Debug)]
pub struct Bootstrapped {
    pub settings: AppSettings,
    pub injector: AppInjector,
}

/// Build the application rooted at `M`.
///
/// Loads configuration through `loader`, installs the tracing subscriber described
/// by its `log` section, then runs the whole module build. Call once per process.
pub fn build_application<M: Module>(loader: &ConfigLoader) -> WeaveResult<Bootstrapped> {
    let LoadedConfig { settings, config } = loader.load()?;
    weave_observability::init_with(&settings.log);

    let span = info_span!("bootstrap", application = %settings.name);
    let _guard = span.enter();

    let injector = AppInjector::build_named::<M>(settings.name.clone(), config)?;
    Ok(Bootstrapped { settings, injector })
}
