//! Controllers, routers and the route table they contribute.
//!
//! Routing itself happens elsewhere; the module graph only collects route
//! descriptions and makes sure every controller (and every injectable guard,
//! interceptor or policy it declares) is constructible from the owning module.

use serde::Serialize;
use weave_core::ProviderKey;
use weave_di::{Injectable, ProviderConfig};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl core::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        })
    }
}

/// A route as declared inside a controller or router, relative to its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDef {
    pub method: HttpMethod,
    pub path: String,
    pub operation: String,
}

/// A fully prefixed route, as consumed by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub operation: String,
    /// Controller or router that declared the route.
    pub owner: String,
    /// Module that owns the controller or router.
    pub module: String,
}

impl core::fmt::Display for Route {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} -> {}::{}", self.method, self.path, self.owner, self.operation)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CrossCuttingKind {
    Guard,
    Interceptor,
    Policy,
}

impl core::fmt::Display for CrossCuttingKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            CrossCuttingKind::Guard => "guard",
            CrossCuttingKind::Interceptor => "interceptor",
            CrossCuttingKind::Policy => "policy",
        })
    }
}

/// A guard, interceptor or policy attached to a controller.
///
/// Injectable ones carry a provider which the owning module registers on its own
/// unless something already provides the type.
#[derive(Debug, Clone)]
pub struct CrossCutting {
    kind: CrossCuttingKind,
    key: ProviderKey,
    provider: Option<ProviderConfig>,
}

impl CrossCutting {
    fn injectable<T: Injectable>(kind: CrossCuttingKind) -> Self {
        Self {
            kind,
            key: ProviderKey::of::<T>(),
            provider: Some(ProviderConfig::class::<T>()),
        }
    }

    fn reference<T: ?Sized + 'static>(kind: CrossCuttingKind) -> Self {
        Self {
            kind,
            key: ProviderKey::of::<T>(),
            provider: None,
        }
    }

    pub fn guard<T: Injectable>() -> Self {
        Self::injectable::<T>(CrossCuttingKind::Guard)
    }

    pub fn interceptor<T: Injectable>() -> Self {
        Self::injectable::<T>(CrossCuttingKind::Interceptor)
    }

    pub fn policy<T: Injectable>() -> Self {
        Self::injectable::<T>(CrossCuttingKind::Policy)
    }

    /// A guard provided elsewhere (e.g. a trait object exported by another module).
    pub fn guard_ref<T: ?Sized + 'static>() -> Self {
        Self::reference::<T>(CrossCuttingKind::Guard)
    }

    pub fn interceptor_ref<T: ?Sized + 'static>() -> Self {
        Self::reference::<T>(CrossCuttingKind::Interceptor)
    }

    pub fn policy_ref<T: ?Sized + 'static>() -> Self {
        Self::reference::<T>(CrossCuttingKind::Policy)
    }

    pub fn kind(&self) -> CrossCuttingKind {
        self.kind
    }

    pub fn key(&self) -> ProviderKey {
        self.key
    }

    pub fn provider(&self) -> Option<&ProviderConfig> {
        self.provider.as_ref()
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let path = path.trim_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => format!("/{prefix}"),
        (false, false) => format!("/{prefix}/{path}"),
    }
}

macro_rules! route_shorthands {
    ($($fn_name:ident => $method:ident),* $(,)?) => {
        $(
            pub fn $fn_name(self, path: impl Into<String>, operation: impl Into<String>) -> Self {
                self.route(HttpMethod::$method, path, operation)
            }
        )*
    };
}

/// A controller: an injectable type whose operations are exposed as routes.
///
/// Controllers are registered as transient providers of the owning module.
#[derive(Debug, Clone)]
pub struct ControllerDescriptor {
    name: String,
    prefix: String,
    provider: ProviderConfig,
    routes: Vec<RouteDef>,
    cross_cutting: Vec<CrossCutting>,
}

impl ControllerDescriptor {
    pub fn new<C: Injectable>(prefix: impl Into<String>) -> Self {
        Self {
            name: ProviderKey::of::<C>().short_name().to_string(),
            prefix: prefix.into(),
            provider: ProviderConfig::class::<C>().transient(),
            routes: Vec::new(),
            cross_cutting: Vec::new(),
        }
    }

    pub fn route(
        mut self,
        method: HttpMethod,
        path: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        self.routes.push(RouteDef {
            method,
            path: path.into(),
            operation: operation.into(),
        });
        self
    }

    route_shorthands! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
    }

    pub fn with(mut self, item: CrossCutting) -> Self {
        self.cross_cutting.push(item);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> ProviderKey {
        self.provider.key()
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn cross_cutting(&self) -> &[CrossCutting] {
        &self.cross_cutting
    }

    pub fn routes(&self, module: &str) -> Vec<Route> {
        expand(&self.name, &self.prefix, &self.routes, module)
    }
}

/// A router: a named group of routes with no injectable owner.
#[derive(Debug, Clone)]
pub struct RouterDescriptor {
    name: String,
    prefix: String,
    routes: Vec<RouteDef>,
}

impl RouterDescriptor {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            routes: Vec::new(),
        }
    }

    pub fn route(
        mut self,
        method: HttpMethod,
        path: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        self.routes.push(RouteDef {
            method,
            path: path.into(),
            operation: operation.into(),
        });
        self
    }

    route_shorthands! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn routes(&self, module: &str) -> Vec<Route> {
        expand(&self.name, &self.prefix, &self.routes, module)
    }
}

fn expand(owner: &str, prefix: &str, defs: &[RouteDef], module: &str) -> Vec<Route> {
    defs.iter()
        .map(|def| Route {
            method: def.method,
            path: join_path(prefix, &def.path),
            operation: def.operation.clone(),
            owner: owner.to_string(),
            module: module.to_string(),
        })
        .collect()
}

/// A CLI command contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub about: String,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
        }
    }
}
