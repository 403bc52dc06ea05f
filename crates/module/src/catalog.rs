//! Side-table of module declarations, keyed by module identity.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use weave_core::{ConfigurationError, ModuleType};

use crate::descriptor::{ModuleDescriptor, ModuleSource};
use crate::dynamic::DynamicModule;

/// Declarations of every module known to one application build.
///
/// A module is declared the first time it is encountered; later encounters reuse
/// the stored descriptor. Dynamic configuration swaps the stored descriptor for a
/// patched copy and counts the patch.
#[derive(Debug, Default)]
pub struct ModuleCatalog {
    entries: HashMap<ModuleType, Arc<ModuleDescriptor>>,
    patches: HashMap<ModuleType, usize>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `source` unless already known, returning the stored descriptor.
    pub fn declare(
        &mut self,
        source: &ModuleSource,
    ) -> Result<Arc<ModuleDescriptor>, ConfigurationError> {
        if let Some(existing) = self.entries.get(&source.module()) {
            return Ok(existing.clone());
        }
        let descriptor = Arc::new(source.declare()?);
        debug!(module = %descriptor.name(), kind = ?descriptor.kind(), "module declared");
        self.entries.insert(source.module(), descriptor.clone());
        Ok(descriptor)
    }

    /// Store a descriptor built outside [`Module::declare`](crate::Module::declare).
    pub fn insert(&mut self, descriptor: ModuleDescriptor) -> Arc<ModuleDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.entries.insert(descriptor.module(), descriptor.clone());
        descriptor
    }

    pub fn get(&self, module: ModuleType) -> Option<Arc<ModuleDescriptor>> {
        self.entries.get(&module).cloned()
    }

    pub fn contains(&self, module: ModuleType) -> bool {
        self.entries.contains_key(&module)
    }

    /// Merge `patch` into the stored descriptor of its target module.
    pub(crate) fn apply_patch(
        &mut self,
        patch: &DynamicModule,
    ) -> Result<Arc<ModuleDescriptor>, ConfigurationError> {
        let module = patch.module();
        let current = self.entries.get(&module).ok_or_else(|| {
            ConfigurationError::not_a_module(module.path(), "the module is not declared")
        })?;
        let patched = Arc::new(current.patched(patch));
        self.entries.insert(module, patched.clone());
        *self.patches.entry(module).or_default() += 1;
        debug!(module = %patched.name(), "module metadata patched");
        Ok(patched)
    }

    /// How many dynamic patches were applied to `module`.
    pub fn patch_count(&self, module: ModuleType) -> usize {
        self.patches.get(&module).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleType, &Arc<ModuleDescriptor>)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}
