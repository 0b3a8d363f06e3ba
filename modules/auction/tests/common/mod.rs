//! Shared fixtures for auction integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use auction_rs::commands::{AuctionCommand, CreateAuction, FinishAuction};
use auction_rs::RelayConfig;
use chrono::{Duration as ChronoDuration, Utc};
use event_bus::consumer_retry::RetryConfig;
use event_bus::{BusError, BusMessage, BusResult, EventBus, InMemoryBus};
use futures::stream::BoxStream;
use uuid::Uuid;

pub fn create_command(reserve_price: i64) -> AuctionCommand {
    AuctionCommand::Create(CreateAuction {
        seller: "bob".to_string(),
        make: "Ford".to_string(),
        model: "GT".to_string(),
        year: 2020,
        color: "White".to_string(),
        mileage: 50_000,
        image_url: "https://cdn.example/gt.jpg".to_string(),
        reserve_price,
        auction_end: Utc::now() + ChronoDuration::days(10),
    })
}

pub fn finish_command(auction_id: Uuid, amount: Option<i64>) -> AuctionCommand {
    AuctionCommand::Finish(FinishAuction {
        auction_id,
        item_sold: amount.is_some(),
        winner: amount.map(|_| "alice".to_string()),
        amount,
    })
}

/// Relay settings that keep tests fast
pub fn fast_relay_config() -> RelayConfig {
    RelayConfig {
        poll_interval: Duration::from_millis(10),
        batch_size: 100,
        publish_timeout: Duration::from_millis(200),
        retry: RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        ..RelayConfig::default()
    }
}

/// Bus that forwards to an [`InMemoryBus`] but can refuse publishes
///
/// Refuses everything while `down`, and every message whose partition key is
/// in `blocked_keys`. Records every accepted message.
pub struct FlakyBus {
    inner: InMemoryBus,
    down: std::sync::atomic::AtomicBool,
    blocked_keys: Mutex<HashSet<String>>,
    attempts: AtomicU32,
    accepted: Mutex<Vec<BusMessage>>,
}

impl FlakyBus {
    pub fn new() -> Self {
        Self {
            inner: InMemoryBus::new(),
            down: std::sync::atomic::AtomicBool::new(false),
            blocked_keys: Mutex::new(HashSet::new()),
            attempts: AtomicU32::new(0),
            accepted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn block_key(&self, key: &str) {
        self.blocked_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn unblock_all(&self) {
        self.blocked_keys.lock().unwrap().clear();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<BusMessage> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for FlakyBus {
    async fn publish(&self, msg: BusMessage) -> BusResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.down.load(Ordering::SeqCst) {
            return Err(BusError::ConnectionError("bus partitioned".to_string()));
        }
        let blocked = msg
            .partition_key
            .as_ref()
            .is_some_and(|k| self.blocked_keys.lock().unwrap().contains(k));
        if blocked {
            return Err(BusError::PublishError("partition unavailable".to_string()));
        }

        self.accepted.lock().unwrap().push(msg.clone());
        self.inner.publish(msg).await
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        self.inner.subscribe(subject).await
    }
}
