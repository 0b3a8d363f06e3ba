use std::sync::Arc;

use event_bus::connect_bus;
use search_rs::{
    config::Config, db, start_projection_consumer, PgProjectionStore, ProjectionConsumer,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting search service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        consumer_id = %config.consumer_id,
        lanes = config.consumer_lanes,
        bus_type = ?config.bus_type,
        "Configuration loaded"
    );

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let bus = connect_bus(&config.bus_type, &config.nats_url)
        .await
        .expect("Failed to connect to event bus");

    let store = Arc::new(PgProjectionStore::new(pool));
    let consumer = Arc::new(ProjectionConsumer::new(store, config.consumer_config()));

    let dispatcher = start_projection_consumer(bus, consumer)
        .await
        .expect("Failed to start projection consumer");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
        }
        _ = dispatcher => {
            tracing::error!("Projection consumer stopped unexpectedly");
        }
    }
}
