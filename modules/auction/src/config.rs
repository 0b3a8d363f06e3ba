use std::env;
use std::time::Duration;

use event_bus::consumer_retry::RetryConfig;
use event_bus::BusType;

use crate::relay::RelayConfig;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: BusType,
    pub nats_url: String,
    pub relay_poll_interval_secs: u64,
    pub relay_batch_size: i64,
    pub relay_publish_timeout_ms: u64,
    pub relay_max_attempts: u32,
    pub outbox_retention_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bus_type = BusType::parse(
            &env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string()),
        )?;

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            relay_poll_interval_secs: parse_var("RELAY_POLL_INTERVAL_SECS", 10)?,
            relay_batch_size: parse_var("RELAY_BATCH_SIZE", 100)?,
            relay_publish_timeout_ms: parse_var("RELAY_PUBLISH_TIMEOUT_MS", 5000)?,
            relay_max_attempts: parse_var("RELAY_MAX_ATTEMPTS", 3)?,
            outbox_retention_hours: parse_var("OUTBOX_RETENTION_HOURS", 168)?,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: Duration::from_secs(self.relay_poll_interval_secs),
            batch_size: self.relay_batch_size,
            publish_timeout: Duration::from_millis(self.relay_publish_timeout_ms),
            retry: RetryConfig {
                max_attempts: self.relay_max_attempts,
                ..RetryConfig::default()
            },
            retention: chrono::Duration::hours(self.outbox_retention_hours),
            ..RelayConfig::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}
