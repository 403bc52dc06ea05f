//! `weave-di`: provider bindings, containers and request scopes.
//!
//! A [`Container`] maps a provided type ([`ProviderKey`](weave_core::ProviderKey)) to a
//! construction strategy and a [`ProviderScope`](weave_core::ProviderScope). Containers
//! form a chain: a lookup that misses locally is delegated to the parent container.
//! Every module in the module tree owns exactly one container.
//!
//! ```text
//! application overrides (core providers)
//!          │  consulted first by every container
//!          ▼
//! root container ◄── module container ◄── module container ◄── RequestScope
//!  (core module)       (AppModule)          (UsersModule)       (per request)
//! ```

pub mod binding;
pub mod container;
pub mod provider;
pub mod request;
pub mod resolver;

pub use container::Container;
pub use provider::{Implementation, Injectable, Instance, ProviderConfig};
pub use request::RequestScope;
pub use resolver::Resolver;
