use weave_app::ConfigLoader;
use weave_app::demo::{AppModule, AuditLog, UsersController};
use weave_core::ModuleType;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = match std::env::var("WEAVE_CONFIG") {
        Ok(path) => ConfigLoader::new().with_file(path),
        Err(_) => ConfigLoader::new(),
    };
    let app = weave_app::build_application::<AppModule>(&loader)?;
    let injector = app.injector;

    for route in injector.get_routes() {
        tracing::info!(%route, "route");
    }
    for command in injector.commands() {
        tracing::info!(command = %command.name, about = %command.about, "command");
    }

    let users = ModuleType::of::<weave_app::demo::UsersModule>();
    let Some(scope) = injector.create_request_scope(users) else {
        anyhow::bail!("users module is not registered");
    };
    let handled = tokio::spawn(async move {
        let controller = scope.get::<UsersController>()?;
        tracing::info!(
            request_id = %scope.id(),
            database = %controller.users.database().url(),
            "handled request"
        );
        Ok::<_, anyhow::Error>(())
    });
    handled.await??;

    let audit = injector.get::<AuditLog>()?;
    tracing::info!(entries = ?audit.entries(), "audit log");
    Ok(())
}
