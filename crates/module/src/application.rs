//! The built application.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use weave_core::{ApplicationId, BindingError};
use weave_di::{Container, RequestScope};

use crate::config::Config;

/// Identity of a built application, resolvable from the root container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationInfo {
    pub id: ApplicationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A fully wired application: the root container plus its configuration.
pub struct Application {
    info: ApplicationInfo,
    container: Arc<Container>,
    config: Config,
}

impl Application {
    pub(crate) fn new(name: impl Into<String>, container: Arc<Container>, config: Config) -> Self {
        Self {
            info: ApplicationInfo {
                id: ApplicationId::new(),
                name: name.into(),
                created_at: Utc::now(),
            },
            container,
            config,
        }
    }

    pub fn id(&self) -> ApplicationId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.info.created_at
    }

    pub fn info(&self) -> &ApplicationInfo {
        &self.info
    }

    /// The root container (owned by the core module).
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve `T` from the root container.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        self.container.get::<T>()
    }

    pub fn get_tagged<T: ?Sized + Send + Sync + 'static>(&self, tag: &str) -> Result<Arc<T>, BindingError> {
        self.container.get_tagged::<T>(tag)
    }

    /// Open a request scope over the root container.
    pub fn create_request_scope(&self) -> RequestScope {
        RequestScope::new(self.container.clone())
    }
}

impl core::fmt::Debug for Application {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .field("created_at", &self.info.created_at)
            .finish()
    }
}
