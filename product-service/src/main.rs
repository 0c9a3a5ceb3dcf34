use anyhow::Context;
use common_observability::ProductMetrics;
use product_service::app_state::AppState;
use product_service::config::{load_service_config, StoreBackend};
use product_service::service::ProductService;
use product_service::store::{MemoryStore, PgStore};
use product_service::build_router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_service_config()?;
    let metrics = Arc::new(ProductMetrics::new().context("Failed to register product metrics")?);

    let service = match config.backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let store = PgStore::connect(database_url, config.db_max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            // Ensure database schema is up to date before serving traffic
            store.migrate().await.context("Failed to run migrations")?;
            ProductService::from_store(store, config.retry, metrics.clone(), config.local_lock)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory product store; data is lost on restart");
            ProductService::from_store(MemoryStore::new(), config.retry, metrics.clone(), config.local_lock)
        }
    };

    let app = build_router(AppState::new(service, metrics));

    let addr = config.bind_addr();
    tracing::info!(%addr, backend = ?config.backend, max_attempts = config.retry.max_attempts, "starting product-service");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
