//! A small application wired from modules, used by the `weave-demo` binary.
//!
//! ```text
//! CoreModule
//! └── AppModule (application)
//!     ├── DatabaseModule   configured from `database.url` by a module setup
//!     ├── UsersModule      forward-references `database`
//!     └── AuditModule      core provider, set up once the application exists
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;
use weave_core::{BindingError, RequestId};
use weave_di::{Injectable, ProviderConfig, Resolver};
use weave_module::{
    Application, CommandDescriptor, Config, ControllerDescriptor, CrossCutting, DynamicModule,
    ForwardRefModule, Module, ModuleDescriptor, ModuleInit, ModuleSetup, RouterDescriptor,
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Debug)]
pub struct Database {
    url: String,
}

impl Database {
    pub fn url(&self) -> &str {
        &self.url
    }
}

pub struct DatabaseModule;

impl Module for DatabaseModule {
    fn declare() -> ModuleDescriptor {
        ModuleDescriptor::builder::<Self>()
            .name("database")
            .command(CommandDescriptor::new("migrate", "apply pending schema migrations"))
            .build()
    }

    fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

impl DatabaseModule {
    /// Configure the connection from the `database.url` configuration key.
    pub fn setup() -> ModuleSetup {
        ModuleSetup::new::<Self, _>(|_, deps| {
            let config = deps.get::<Config>()?;
            let url = config
                .get::<String>("database.url")?
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
            Ok(DynamicModule::new::<Self>().provider(ProviderConfig::value(Database { url }).export()))
        })
        .inject::<Config>()
    }
}

pub struct UserService {
    db: Arc<Database>,
}

impl UserService {
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl Injectable for UserService {
    fn inject(resolver: &Resolver<'_>) -> Result<Self, BindingError> {
        Ok(Self { db: resolver.get()? })
    }
}

/// Per-request state shared by everything resolved inside one request scope.
#[derive(Debug)]
pub struct RequestContext {
    pub id: Option<RequestId>,
}

pub struct AuthGuard;

impl Injectable for AuthGuard {
    fn inject(_: &Resolver<'_>) -> Result<Self, BindingError> {
        Ok(Self)
    }
}

pub struct UsersController {
    pub users: Arc<UserService>,
    pub request: Arc<RequestContext>,
}

impl Injectable for UsersController {
    fn inject(resolver: &Resolver<'_>) -> Result<Self, BindingError> {
        Ok(Self {
            users: resolver.get()?,
            request: resolver.get()?,
        })
    }
}

pub struct UsersModule;

impl Module for UsersModule {
    fn declare() -> ModuleDescriptor {
        ModuleDescriptor::builder::<Self>()
            .name("users")
            .provider(ProviderConfig::class::<UserService>().export())
            .provider(
                ProviderConfig::factory(|r: &Resolver<'_>| {
                    Ok(Arc::new(RequestContext { id: r.request_id() }))
                })
                .request_scoped(),
            )
            .controller(
                ControllerDescriptor::new::<UsersController>("/users")
                    .get("/", "list")
                    .get("/{id}", "show")
                    .post("/", "create")
                    .with(CrossCutting::guard::<AuthGuard>()),
            )
            .import_from(ForwardRefModule::by_name("database"))
            .build()
    }

    fn create(init: &ModuleInit<'_>) -> anyhow::Result<Self> {
        init.get::<UserService>()?;
        Ok(Self)
    }
}

/// Records notable events; hoisted so every module resolves the same instance.
#[derive(Debug, Default)]
pub struct AuditLog {
    application: String,
    entries: Mutex<Vec<String>>,
}

impl AuditLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn application(&self) -> &str {
        &self.application
    }
}

pub struct AuditModule;

impl Module for AuditModule {
    fn declare() -> ModuleDescriptor {
        ModuleDescriptor::builder::<Self>().name("audit").build()
    }

    fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

impl AuditModule {
    pub fn setup() -> ModuleSetup {
        ModuleSetup::new::<Self, _>(|_, deps| {
            let application = deps.application()?.name().to_string();
            let log = AuditLog {
                application,
                entries: Mutex::default(),
            };
            Ok(DynamicModule::new::<Self>().provider(ProviderConfig::value(log).core()))
        })
        .inject_application()
    }
}

pub struct AppModule;

impl Module for AppModule {
    fn declare() -> ModuleDescriptor {
        ModuleDescriptor::application::<Self>()
            .name("app")
            .import_from(DatabaseModule::setup())
            .import::<UsersModule>()
            .import_from(AuditModule::setup())
            .router(RouterDescriptor::new("health", "/health").get("/", "status"))
            .build()
    }

    fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn application_ready(&self, app: &Application) -> anyhow::Result<()> {
        let audit = app.get::<AuditLog>()?;
        audit.record(format!("{} ready", app.name()));
        info!(application = %app.name(), "demo application ready");
        Ok(())
    }
}
