use std::sync::Arc;

use anyhow::Context;
use articles_api::app::{create_app, AppState};
use articles_api::config::{AppConfig, RbacConfig};
use articles_api::events::{init_event_bus, start_activity_listener};
use articles_api::utils::Argon2Hasher;
use articles_api::{db, docs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env()?;
    let pool = db::init(&config.database_url).await?;

    let rbac = RbacConfig::resolve(&pool, &config.default_role_name, config.regrant_policy).await?;
    tracing::info!(regrant_policy = ?rbac.regrant_policy, "permission re-grant policy");

    let hasher = Argon2Hasher::new(config.hash_cost)?;

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, rbac, Arc::new(hasher), Arc::new(event_bus));

    let openapi = docs::build_openapi(config.port)?;
    let app = create_app(state).merge(docs::swagger_routes(openapi));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on http://{addr}");
    tracing::info!("swagger ui on http://localhost:{}/docs", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
