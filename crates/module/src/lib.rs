//! `weave-module`: module declarations, the module tree and the injector root.
//!
//! An application is a tree of modules. Each module is declared once
//! ([`Module::declare`]) as an immutable [`ModuleDescriptor`]; the [`AppInjector`]
//! walks the imports from the root module, registers every module in a
//! [`ModuleTreeManager`], gives each one its own container and drives it through
//! the [`ModuleRef`] lifecycle.

pub mod application;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod dynamic;
pub mod forward_ref;
pub mod injector;
pub mod module;
pub mod module_ref;
pub mod setup;
pub mod tree;

pub use application::{Application, ApplicationInfo};
pub use catalog::ModuleCatalog;
pub use config::Config;
pub use controller::{
    CommandDescriptor, ControllerDescriptor, CrossCutting, CrossCuttingKind, HttpMethod, Route,
    RouterDescriptor,
};
pub use descriptor::{ModuleBuilder, ModuleDescriptor, ModuleImport, ModuleKind, ModuleSource};
pub use dynamic::DynamicModule;
pub use forward_ref::{ForwardRefModule, ForwardTarget};
pub use injector::{AppInjector, CoreModule, ModuleEntry};
pub use module::{Module, ModuleHooks, ModuleInit};
pub use module_ref::{ModuleRef, ModuleState};
pub use setup::{Injected, Injection, ModuleSetup, SetupContext};
pub use tree::{Edge, ModuleTreeManager, TreeNode};
