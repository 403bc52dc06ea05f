//! Provider lifetimes.

use serde::{Deserialize, Serialize};

/// How long a constructed provider instance lives.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderScope {
    /// One instance per container for the container's lifetime.
    #[default]
    Singleton,
    /// A fresh instance on every resolution.
    Transient,
    /// One instance per logical request, held by the request scope.
    Request,
}

impl core::fmt::Display for ProviderScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ProviderScope::Singleton => "singleton",
            ProviderScope::Transient => "transient",
            ProviderScope::Request => "request",
        })
    }
}
