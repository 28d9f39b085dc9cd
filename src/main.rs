use anyhow::Context;
use sumatra_server::config;
use sumatra_server::database::DatabaseManager;
use sumatra_server::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    sumatra_server::init_tracing();

    let config = config::config().clone();
    tracing::info!("Starting Sumatra server in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        if sumatra_server::is_production!() {
            anyhow::bail!("SECURITY_JWT_SECRET must be set in production");
        }
        tracing::warn!("SECURITY_JWT_SECRET is empty; browser logins are disabled");
    }

    let store = DatabaseManager::open_store(&config.database)
        .await
        .context("opening record store")?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let mount = config.api.mount.clone();
    let app = app(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Sumatra server listening on http://{}{}", bind_addr, mount);

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
