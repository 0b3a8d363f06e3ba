//! Shared fixtures for search integration tests

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use auction_contracts::{
    AuctionDeleted, AuctionEnvelope, AuctionEvent, AuctionSnapshot, AuctionStatus, BidPlaced,
    BidStatus, SOURCE_MODULE,
};
use chrono::{DateTime, Utc};
use event_bus::consumer_retry::RetryConfig;
use event_bus::{BusMessage, EventEnvelope};
use search_rs::ConsumerConfig;
use uuid::Uuid;

pub const CONSUMER: &str = "search-test";

pub fn test_consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        consumer_id: CONSUMER.to_string(),
        lanes: 4,
        lane_capacity: 64,
        apply_timeout: Duration::from_millis(50),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
    }
}

pub fn snapshot(id: Uuid, at: DateTime<Utc>) -> AuctionSnapshot {
    AuctionSnapshot {
        id,
        reserve_price: 100,
        seller: "bob".to_string(),
        winner: None,
        sold_amount: None,
        current_high_bid: None,
        created_at: at,
        updated_at: at,
        auction_end: at + chrono::Duration::days(7),
        status: AuctionStatus::Live,
        make: "Ford".to_string(),
        model: "GT".to_string(),
        year: 2020,
        color: "White".to_string(),
        mileage: 50_000,
        image_url: "https://cdn.example/gt.jpg".to_string(),
        version: 1,
    }
}

pub fn envelope(payload: AuctionEvent, at: DateTime<Utc>) -> AuctionEnvelope {
    EventEnvelope::new(
        payload.auction_id().to_string(),
        SOURCE_MODULE.to_string(),
        payload,
    )
    .with_occurred_at(at)
}

pub fn created(id: Uuid, at: DateTime<Utc>) -> AuctionEnvelope {
    envelope(AuctionEvent::Created(snapshot(id, at)), at)
}

pub fn updated_color(id: Uuid, color: &str, at: DateTime<Utc>) -> AuctionEnvelope {
    let mut s = snapshot(id, at);
    s.color = color.to_string();
    s.version = 2;
    envelope(AuctionEvent::Updated(s), at)
}

pub fn deleted(id: Uuid, at: DateTime<Utc>) -> AuctionEnvelope {
    envelope(AuctionEvent::Deleted(AuctionDeleted { id }), at)
}

pub fn bid(id: Uuid, amount: i64, at: DateTime<Utc>) -> AuctionEnvelope {
    envelope(
        AuctionEvent::BidPlaced(BidPlaced {
            id: Uuid::new_v4(),
            auction_id: id,
            bidder: "alice".to_string(),
            bid_time: at,
            amount,
            bid_status: BidStatus::Accepted,
        }),
        at,
    )
}

/// Bus message exactly as the outbox relay would publish it
pub fn message(envelope: &AuctionEnvelope) -> BusMessage {
    BusMessage::new(
        envelope.subject(SOURCE_MODULE),
        serde_json::to_vec(envelope).unwrap(),
    )
    .with_partition_key(envelope.aggregate_id.clone())
    .with_message_id(envelope.envelope_id.to_string())
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
