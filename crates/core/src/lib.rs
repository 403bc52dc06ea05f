//! `weave-core`: identities, scopes and the error model shared by every layer.
//!
//! This crate has no knowledge of containers or module trees; it only defines the
//! vocabulary they speak.

pub mod error;
pub mod id;
pub mod scope;

pub use error::{BindingError, ConfigurationError, TreeError, WeaveError, WeaveResult};
pub use id::{ApplicationId, ModuleType, ProviderKey, RequestId};
pub use scope::ProviderScope;
