//! Error model for module composition and provider resolution.
//!
//! Errors fall into three families:
//!
//! - [`ConfigurationError`]: the declared module structure is invalid. These are fatal at
//!   startup and always name the offending module or type.
//! - [`BindingError`]: a provider could not be resolved. These surface at the first
//!   resolution attempt and name both the consumer and the missing dependency.
//! - [`TreeError`]: misuse of the module tree registry (duplicate or orphaned nodes).
//!
//! [`WeaveError`] is the umbrella returned by the bootstrap entry points.

use thiserror::Error;

/// Result type returned by the bootstrap layer.
pub type WeaveResult<T> = Result<T, WeaveError>;

/// Structural error in the module declarations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A type was used where a module was expected, but no declaration exists for it
    /// (or it is a plain module where a decorated one is required).
    #[error("`{type_name}` is not a module: {reason}")]
    NotAModule { type_name: String, reason: String },

    /// A module declaration violates the module contract.
    #[error("invalid module `{module}`: {reason}")]
    InvalidModuleType { module: String, reason: String },

    /// More than one application module was installed into one application.
    #[error(
        "only one application module is permitted per application instance \
         (`{existing}` is already installed, found `{found}`)"
    )]
    MultipleApplicationModules { existing: String, found: String },

    /// The core module may only depend on the application root.
    #[error("the core module may have at most one dependency, found {count}")]
    CoreModuleDependencies { count: usize },

    /// A forward reference could not be matched against the module tree.
    #[error("module `{module}` references `{target}`, which is not registered in the module tree")]
    UnresolvedForwardRef { module: String, target: String },

    /// A module setup factory produced an unusable dynamic module.
    #[error("invalid dynamic module for `{module}`: {reason}")]
    InvalidDynamicModule { module: String, reason: String },

    /// A deferred module setup could not obtain one of its declared dependencies.
    #[error("setup of module `{module}` failed: {reason}")]
    ModuleSetupFailed { module: String, reason: String },

    /// A module exports a provider it neither owns nor received from a dependency.
    #[error("module `{module}` exports `{provider}`, which it does not provide")]
    InvalidExport { module: String, provider: String },

    /// A configuration value could not be interpreted.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

impl ConfigurationError {
    pub fn not_a_module(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotAModule {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_module(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidModuleType {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_dynamic_module(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDynamicModule {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub fn unresolved_forward_ref(module: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnresolvedForwardRef {
            module: module.into(),
            target: target.into(),
        }
    }

    pub fn setup_failed(module: impl Into<String>, reason: impl core::fmt::Display) -> Self {
        Self::ModuleSetupFailed {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}

/// Provider resolution failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Top-level lookup found no binding anywhere in the container chain.
    #[error("no provider for `{provider}` is registered in `{container}` or its parents")]
    NotFound { provider: String, container: String },

    /// A provider under construction requires a type nobody provides.
    #[error("`{consumer}` requires `{missing}`, but no provider for it is visible")]
    UnsatisfiedRequirement { consumer: String, missing: String },

    /// Resolution re-entered a provider that is still under construction.
    #[error("circular dependency: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// A request-scoped provider was resolved outside of a request scope.
    #[error("`{provider}` is request-scoped and can only be resolved inside a request scope")]
    RequestScopeRequired { provider: String },

    /// The stored instance does not have the requested type.
    #[error("provider registered for `{provider}` holds a value of a different type")]
    TypeMismatch { provider: String },

    /// Registration was attempted after the container was frozen.
    #[error("container `{container}` is frozen; cannot register `{provider}`")]
    Frozen { container: String, provider: String },

    /// A factory failed for a reason unrelated to resolution.
    #[error("failed to construct `{provider}`: {message}")]
    Construction { provider: String, message: String },
}

impl BindingError {
    pub fn construction(provider: impl Into<String>, message: impl core::fmt::Display) -> Self {
        Self::Construction {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// Module tree registry misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("module `{module}` is already registered in the module tree")]
    AlreadyRegistered { module: String },

    #[error("cannot register `{module}`: parent module `{parent}` is not registered")]
    ParentNotRegistered { module: String, parent: String },

    #[error("module `{module}` is not registered in the module tree")]
    NotRegistered { module: String },
}

/// Umbrella error for application bootstrap.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    /// A user lifecycle hook (module constructor, service registration, application
    /// ready, setup factory) failed.
    #[error("module `{module}` failed in {stage}: {source}")]
    Hook {
        module: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl WeaveError {
    pub fn hook(module: impl Into<String>, stage: &'static str, source: anyhow::Error) -> Self {
        Self::Hook {
            module: module.into(),
            stage,
            source,
        }
    }

    /// The structural error, if this is one.
    pub fn as_configuration(&self) -> Option<&ConfigurationError> {
        match self {
            WeaveError::Configuration(e) => Some(e),
            _ => None,
        }
    }

    /// The resolution error, if this is one.
    pub fn as_binding(&self) -> Option<&BindingError> {
        match self {
            WeaveError::Binding(e) => Some(e),
            _ => None,
        }
    }
}
