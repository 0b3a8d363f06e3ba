use std::env;
use std::time::Duration;

use event_bus::consumer_retry::RetryConfig;
use event_bus::BusType;

use crate::consumer::ConsumerConfig;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: BusType,
    pub nats_url: String,
    pub consumer_id: String,
    pub consumer_lanes: usize,
    pub apply_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
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

        let consumer_id =
            env::var("CONSUMER_ID").unwrap_or_else(|_| "search-projection".to_string());
        if consumer_id.trim().is_empty() {
            return Err("CONSUMER_ID cannot be empty".to_string());
        }

        let max_attempts: u32 = parse_var("MAX_ATTEMPTS", 5)?;
        if max_attempts == 0 {
            return Err("MAX_ATTEMPTS must be at least 1".to_string());
        }

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            consumer_id,
            consumer_lanes: parse_var("CONSUMER_LANES", 8)?,
            apply_timeout_ms: parse_var("APPLY_TIMEOUT_MS", 5000)?,
            max_attempts,
            retry_initial_backoff_ms: parse_var("RETRY_INITIAL_BACKOFF_MS", 100)?,
        })
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            consumer_id: self.consumer_id.clone(),
            lanes: self.consumer_lanes,
            apply_timeout: Duration::from_millis(self.apply_timeout_ms),
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
                ..RetryConfig::default()
            },
            ..ConsumerConfig::default()
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
