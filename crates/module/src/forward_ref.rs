//! Forward references to modules that are registered elsewhere in the tree.

use std::sync::{Arc, OnceLock};

use weave_core::{ConfigurationError, ModuleType};

/// How a forward reference addresses its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForwardTarget {
    /// Module name (`UsersModule`, or a custom declared name).
    Name(String),
    /// Full type path (`my_app::users::UsersModule`).
    Path(String),
    Type(ModuleType),
}

impl core::fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ForwardTarget::Name(name) => write!(f, "name `{name}`"),
            ForwardTarget::Path(path) => write!(f, "path `{path}`"),
            ForwardTarget::Type(module) => write!(f, "type `{}`", module.path()),
        }
    }
}

/// A dependency edge whose target is looked up once the module tree has been
/// populated.
///
/// Clones share the resolution result.
#[derive(Debug, Clone)]
pub struct ForwardRefModule {
    target: ForwardTarget,
    resolved: Arc<OnceLock<ModuleType>>,
}

impl ForwardRefModule {
    fn new(target: ForwardTarget) -> Self {
        Self {
            target,
            resolved: Arc::new(OnceLock::new()),
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self::new(ForwardTarget::Name(name.into()))
    }

    pub fn by_path(path: impl Into<String>) -> Self {
        Self::new(ForwardTarget::Path(path.into()))
    }

    pub fn by_type<M: 'static>() -> Self {
        Self::new(ForwardTarget::Type(ModuleType::of::<M>()))
    }

    pub fn target(&self) -> &ForwardTarget {
        &self.target
    }

    pub fn resolved(&self) -> Option<ModuleType> {
        self.resolved.get().copied()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Resolve against `candidates` (module identity and declared name).
    ///
    /// Resolving an already resolved reference returns the earlier result.
    pub fn resolve<'a, I>(&self, declaring: &str, candidates: I) -> Result<ModuleType, ConfigurationError>
    where
        I: IntoIterator<Item = (ModuleType, &'a str)>,
    {
        if let Some(module) = self.resolved() {
            return Ok(module);
        }
        let found = candidates.into_iter().find_map(|(module, name)| {
            let hit = match &self.target {
                ForwardTarget::Name(wanted) => name == wanted.as_str() || module.name() == wanted.as_str(),
                ForwardTarget::Path(wanted) => module.path() == wanted.as_str(),
                ForwardTarget::Type(wanted) => module == *wanted,
            };
            hit.then_some(module)
        });
        let module = found.ok_or_else(|| {
            ConfigurationError::unresolved_forward_ref(declaring, self.target.to_string())
        })?;
        Ok(*self.resolved.get_or_init(|| module))
    }
}

impl PartialEq for ForwardRefModule {
    fn eq(&self, other: &Self) -> bool {
        match (self.resolved(), other.resolved()) {
            (Some(a), Some(b)) => a == b,
            _ => self.target == other.target,
        }
    }
}

impl Eq for ForwardRefModule {}

impl core::fmt::Display for ForwardRefModule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "forward ref to {}", self.target)
    }
}
