use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Open the auction database pool
///
/// Pool sizing comes from `DB_MAX_CONNECTIONS` (10), `DB_MIN_CONNECTIONS` (0)
/// and `DB_ACQUIRE_TIMEOUT_SECS` (3). Test runs set these low so parallel
/// test binaries do not exhaust Postgres.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(env_or("DB_MAX_CONNECTIONS", 10))
        .min_connections(env_or("DB_MIN_CONNECTIONS", 0))
        .acquire_timeout(Duration::from_secs(env_or("DB_ACQUIRE_TIMEOUT_SECS", 3)))
        .connect(database_url)
        .await
}

/// Apply the `auctions` and `auction_outbox` migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./db/migrations").run(pool).await
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
