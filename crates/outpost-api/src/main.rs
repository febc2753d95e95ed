mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use outpost_core::db::{Database, LibSqlRecordStore};
use outpost_core::SyncEngine;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("outpost_api=info".parse()?)
                .add_directive("outpost_core=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting outpost-api with config: {:?}", config);

    let db = Database::open(&config.database_path).await?;
    let engine = SyncEngine::open(LibSqlRecordStore::new(db)).await?;
    tracing::info!(
        database = config.database_path.as_str(),
        server_timestamp = engine.server_timestamp(),
        "Sync engine ready"
    );

    let state = AppState::new(Arc::clone(&config), engine);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("outpost-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
