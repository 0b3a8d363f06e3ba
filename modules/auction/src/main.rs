use std::sync::Arc;

use auction_rs::{config::Config, db, OutboxRelay, PgAuctionStore};
use event_bus::connect_bus;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting auction service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        bus_type = ?config.bus_type,
        poll_interval_secs = config.relay_poll_interval_secs,
        batch_size = config.relay_batch_size,
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

    let store = Arc::new(PgAuctionStore::new(pool));
    let relay = OutboxRelay::new(store, bus, config.relay_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = tokio::spawn(async move { relay.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");

    tracing::info!("Shutdown requested, stopping relay");
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_task.await {
        tracing::error!(error = %e, "Relay task ended abnormally");
    }
}
