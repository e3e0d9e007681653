mod appointments;
mod clients;
mod config;
mod error;
mod routes;
mod scheduler;

use std::sync::Arc;

use tokio::sync::Mutex;

use wellness_core::db::{seed_demo_data, Database};
use wellness_core::remote::{RemoteApiConfig, SchedulingApiClient};
use wellness_core::sync::SyncEngine;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wellness_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting wellness-api with config: {:?}", config);

    let database = Database::open(&config.database_path)?;
    if config.seed_demo {
        let inserted = seed_demo_data(database.connection())?;
        tracing::info!("Seeded {inserted} demo records");
    }
    let db = Arc::new(Mutex::new(database));

    let remote = SchedulingApiClient::new(
        RemoteApiConfig::new(config.external_api_url.clone())
            .with_timeout(config.external_api_timeout)
            .with_max_retries(config.external_api_retries),
    )?;
    let engine = SyncEngine::new(Arc::clone(&db), remote.clone());
    let scheduler = Arc::new(scheduler::spawn_sync_jobs(&engine, &config));

    let state = AppState {
        db,
        engine,
        remote,
        scheduler,
    };
    let bind_addr = config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("wellness-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
