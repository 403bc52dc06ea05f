//! Module tree registry and traversal.

use std::collections::HashMap;

use weave_core::{ModuleType, TreeError};

use crate::forward_ref::ForwardRefModule;

/// A dependency edge: either a concrete module or a forward reference that is
/// followed once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    Module(ModuleType),
    Forward(ForwardRefModule),
}

impl Edge {
    /// The module the edge points at, if known.
    pub fn target(&self) -> Option<ModuleType> {
        match self {
            Edge::Module(module) => Some(*module),
            Edge::Forward(forward) => forward.resolved(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode<V> {
    value: V,
    parent: Option<ModuleType>,
    dependencies: Vec<Edge>,
}

impl<V> TreeNode<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn parent(&self) -> Option<ModuleType> {
        self.parent
    }

    pub fn dependencies(&self) -> &[Edge] {
        &self.dependencies
    }
}

/// Registry of every module in an application, with its parent and dependency
/// edges.
///
/// Lookups of absent modules return `None` so callers can tell "not registered
/// yet" apart from real errors. Iteration and traversal follow registration
/// order.
#[derive(Debug)]
pub struct ModuleTreeManager<V> {
    nodes: HashMap<ModuleType, TreeNode<V>>,
    order: Vec<ModuleType>,
    forward_refs: Vec<ForwardRefModule>,
}

impl<V> Default for ModuleTreeManager<V> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            forward_refs: Vec::new(),
        }
    }
}

impl<V> ModuleTreeManager<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(
        &mut self,
        module: ModuleType,
        value: V,
        parent: Option<ModuleType>,
    ) -> Result<(), TreeError> {
        if self.nodes.contains_key(&module) {
            return Err(TreeError::AlreadyRegistered {
                module: module.path().to_string(),
            });
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                return Err(TreeError::ParentNotRegistered {
                    module: module.path().to_string(),
                    parent: parent.path().to_string(),
                });
            }
        }
        self.nodes.insert(
            module,
            TreeNode {
                value,
                parent,
                dependencies: Vec::new(),
            },
        );
        self.order.push(module);
        Ok(())
    }

    /// Replace the stored value, keeping the dependency list. `parent`, when
    /// given, re-parents the node. Returns the previous value.
    pub fn update_module(
        &mut self,
        module: ModuleType,
        value: V,
        parent: Option<ModuleType>,
    ) -> Result<V, TreeError> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                return Err(TreeError::ParentNotRegistered {
                    module: module.path().to_string(),
                    parent: parent.path().to_string(),
                });
            }
        }
        let node = self.nodes.get_mut(&module).ok_or_else(|| TreeError::NotRegistered {
            module: module.path().to_string(),
        })?;
        if parent.is_some() {
            node.parent = parent;
        }
        Ok(std::mem::replace(&mut node.value, value))
    }

    pub fn add_or_update(
        &mut self,
        module: ModuleType,
        value: V,
        parent: Option<ModuleType>,
    ) -> Result<(), TreeError> {
        if self.nodes.contains_key(&module) {
            self.update_module(module, value, parent).map(drop)
        } else {
            self.add_module(module, value, parent)
        }
    }

    /// Record a dependency edge from `parent`. Duplicate edges are ignored.
    pub fn add_dependency(&mut self, parent: ModuleType, edge: Edge) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&parent).ok_or_else(|| TreeError::NotRegistered {
            module: parent.path().to_string(),
        })?;
        if !node.dependencies.contains(&edge) {
            node.dependencies.push(edge);
        }
        Ok(())
    }

    /// Register a resolved forward reference as an alias of its target.
    ///
    /// The alias owns no node of its own: lookups through it land on the target's
    /// node, with the target's parent and dependencies.
    pub fn add_forward_ref(&mut self, forward: &ForwardRefModule) -> Result<ModuleType, TreeError> {
        let target = forward.resolved().ok_or_else(|| TreeError::NotRegistered {
            module: forward.target().to_string(),
        })?;
        if !self.nodes.contains_key(&target) {
            return Err(TreeError::NotRegistered {
                module: target.path().to_string(),
            });
        }
        if !self.forward_refs.contains(forward) {
            self.forward_refs.push(forward.clone());
        }
        Ok(target)
    }

    pub fn get_module(&self, module: ModuleType) -> Option<&TreeNode<V>> {
        self.nodes.get(&module)
    }

    pub fn get_module_mut(&mut self, module: ModuleType) -> Option<&mut TreeNode<V>> {
        self.nodes.get_mut(&module)
    }

    /// Follow a forward reference alias to its target node.
    pub fn get_forward_ref(&self, forward: &ForwardRefModule) -> Option<(ModuleType, &TreeNode<V>)> {
        let alias = self.forward_refs.iter().find(|known| *known == forward)?;
        let target = alias.resolved()?;
        self.nodes.get(&target).map(|node| (target, node))
    }

    pub fn contains(&self, module: ModuleType) -> bool {
        self.nodes.contains_key(&module)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Modules in registration order.
    pub fn modules(&self) -> &[ModuleType] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleType, &TreeNode<V>)> {
        self.order.iter().filter_map(|m| self.nodes.get(m).map(|n| (*m, n)))
    }

    /// Direct dependencies of `parent` that satisfy `predicate`.
    ///
    /// Forward edges are followed to their targets; unresolved ones are skipped.
    pub fn get_module_dependencies<P>(&self, parent: ModuleType, predicate: P) -> Vec<(ModuleType, &TreeNode<V>)>
    where
        P: Fn(ModuleType, &TreeNode<V>) -> bool,
    {
        let Some(node) = self.nodes.get(&parent) else {
            return Vec::new();
        };
        node.dependencies
            .iter()
            .filter_map(Edge::target)
            .filter_map(|m| self.nodes.get(&m).map(|n| (m, n)))
            .filter(|(m, n)| predicate(*m, n))
            .collect()
    }

    /// Modules with a dependency edge to `module`.
    pub fn dependents_of(&self, module: ModuleType) -> Vec<ModuleType> {
        self.iter()
            .filter(|(_, node)| node.dependencies.iter().any(|e| e.target() == Some(module)))
            .map(|(m, _)| m)
            .collect()
    }

    /// Lazily yield every module satisfying `predicate`, in registration order.
    pub fn find_module<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = (ModuleType, &'a TreeNode<V>)>
    where
        P: Fn(ModuleType, &TreeNode<V>) -> bool,
    {
        self.iter().filter(move |(m, n)| predicate(*m, n))
    }

    /// Depth-first search from every module matching `root_filter`, returning the
    /// first module matching `find`.
    ///
    /// A module already on the current path is skipped, so cycles terminate.
    pub fn search_module_tree<R, F>(&self, root_filter: R, find: F) -> Option<(ModuleType, &TreeNode<V>)>
    where
        R: Fn(ModuleType, &TreeNode<V>) -> bool,
        F: Fn(ModuleType, &TreeNode<V>) -> bool,
    {
        let mut stack = Vec::new();
        self.iter()
            .filter(|(m, n)| root_filter(*m, n))
            .find_map(|(root, _)| self.search_from(root, &find, &mut stack))
    }

    fn search_from<F>(
        &self,
        module: ModuleType,
        find: &F,
        stack: &mut Vec<ModuleType>,
    ) -> Option<(ModuleType, &TreeNode<V>)>
    where
        F: Fn(ModuleType, &TreeNode<V>) -> bool,
    {
        let node = self.nodes.get(&module)?;
        if find(module, node) {
            return Some((module, node));
        }
        stack.push(module);
        let mut found = None;
        for dependency in node.dependencies.iter().filter_map(Edge::target) {
            if stack.contains(&dependency) {
                continue;
            }
            found = self.search_from(dependency, find, stack);
            if found.is_some() {
                break;
            }
        }
        stack.pop();
        found
    }

    /// Every module reachable from `root`, parents before children, each once.
    pub fn dfs_order(&self, root: ModuleType) -> Vec<ModuleType> {
        let mut seen = Vec::new();
        self.collect_dfs(root, &mut seen);
        seen
    }

    fn collect_dfs(&self, module: ModuleType, seen: &mut Vec<ModuleType>) {
        if seen.contains(&module) {
            return;
        }
        let Some(node) = self.nodes.get(&module) else {
            return;
        };
        seen.push(module);
        for dependency in node.dependencies.iter().filter_map(Edge::target) {
            self.collect_dfs(dependency, seen);
        }
    }
}
