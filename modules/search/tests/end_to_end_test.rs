//! Auction commands through the outbox relay into the search projection

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use auction_rs::commands::{
    AuctionCommand, CreateAuction, DeleteAuction, FinishAuction, PlaceBid, UpdateAuction,
};
use auction_rs::{AuctionService, InMemoryAuctionStore, OutboxRelay, RelayConfig};
use auction_contracts::{AuctionStatus, AUCTION_EVENTS_PATTERN};
use chrono::{Duration as ChronoDuration, Utc};
use common::{test_consumer_config, wait_until, CONSUMER};
use event_bus::consumer_retry::RetryConfig;
use event_bus::{BusMessage, EventBus, InMemoryBus};
use futures::StreamExt;
use search_rs::consumer::decode;
use search_rs::{
    rebuild, start_projection_consumer, InMemoryProjectionStore, ProjectionConsumer,
    ProjectionStore,
};
use uuid::Uuid;

fn create(color: &str, reserve_price: i64) -> AuctionCommand {
    AuctionCommand::Create(CreateAuction {
        seller: "bob".to_string(),
        make: "Ford".to_string(),
        model: "GT".to_string(),
        year: 2020,
        color: color.to_string(),
        mileage: 50_000,
        image_url: "https://cdn.example/gt.jpg".to_string(),
        reserve_price,
        auction_end: Utc::now() + ChronoDuration::days(10),
    })
}

fn relay_config() -> RelayConfig {
    RelayConfig {
        poll_interval: Duration::from_millis(10),
        publish_timeout: Duration::from_millis(200),
        retry: RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        ..RelayConfig::default()
    }
}

/// Collect everything published on the auction subjects
async fn record(bus: &Arc<dyn EventBus>) -> Arc<Mutex<Vec<BusMessage>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut stream = bus.subscribe(AUCTION_EVENTS_PATTERN).await.unwrap();
    let sink = seen.clone();
    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            sink.lock().unwrap().push(msg);
        }
    });
    seen
}

#[tokio::test]
async fn test_projection_converges_despite_duplicate_publish() {
    let auctions = Arc::new(InMemoryAuctionStore::new());
    let service = AuctionService::new(auctions.clone());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let relay = OutboxRelay::new(auctions.clone(), bus.clone(), relay_config());

    let projection = Arc::new(InMemoryProjectionStore::new());
    let consumer = Arc::new(ProjectionConsumer::new(
        projection.clone(),
        test_consumer_config(),
    ));
    let _dispatcher = start_projection_consumer(bus.clone(), consumer)
        .await
        .unwrap();
    let published = record(&bus).await;

    let red = service.handle(create("White", 100)).await.unwrap();
    let red_id = red.auction.unwrap().id;
    let sold = service.handle(create("Black", 100)).await.unwrap();
    let sold_id = sold.auction.unwrap().id;
    let gone = service.handle(create("Grey", 0)).await.unwrap();
    let gone_id = gone.auction.unwrap().id;

    service
        .handle(AuctionCommand::Update(UpdateAuction {
            auction_id: red_id,
            color: Some("Red".to_string()),
            ..UpdateAuction::default()
        }))
        .await
        .unwrap();
    for amount in [80, 150] {
        service
            .handle(AuctionCommand::PlaceBid(PlaceBid {
                auction_id: sold_id,
                bidder: "alice".to_string(),
                amount,
            }))
            .await
            .unwrap();
    }
    service
        .handle(AuctionCommand::Finish(FinishAuction {
            auction_id: sold_id,
            item_sold: true,
            winner: Some("alice".to_string()),
            amount: Some(150),
        }))
        .await
        .unwrap();
    service
        .handle(AuctionCommand::Delete(DeleteAuction {
            auction_id: gone_id,
            expected_version: None,
        }))
        .await
        .unwrap();

    // First publish lands on the bus but is not marked, so it goes out twice
    auctions.fail_mark_delivered(1);
    for _ in 0..5 {
        relay.relay_batch().await.unwrap();
    }
    let records = auctions.outbox_records().await;
    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r.delivered));

    let converged = wait_until(Duration::from_secs(5), || {
        let projection = projection.clone();
        async move {
            let red = projection.get(red_id).await.unwrap();
            let sold = projection.get(sold_id).await.unwrap();
            let gone = projection.get(gone_id).await.unwrap();
            matches!(red, Some(ref item) if item.color == "Red")
                && matches!(sold, Some(ref item) if item.status == AuctionStatus::Finished)
                && gone.is_none()
        }
    })
    .await;
    assert!(converged, "projection should reflect every committed command");

    let sold_item = projection.get(sold_id).await.unwrap().unwrap();
    assert_eq!(sold_item.current_high_bid, Some(150));
    assert_eq!(sold_item.sold_amount, Some(150));
    assert_eq!(sold_item.winner.as_deref(), Some("alice"));
    assert_eq!(projection.ledger_len().await, 8);
    assert!(projection.dead_letters(CONSUMER).await.unwrap().is_empty());

    // Replaying the published history (duplicate included) rebuilds the same view
    let all_recorded = wait_until(Duration::from_secs(2), || {
        let published = published.clone();
        async move { published.lock().unwrap().len() == 9 }
    })
    .await;
    assert!(all_recorded);
    let history: Vec<BusMessage> = published.lock().unwrap().clone();
    let envelopes = history
        .iter()
        .map(|msg| decode(msg).unwrap())
        .collect::<Vec<_>>();

    let fresh = InMemoryProjectionStore::new();
    let report = rebuild(&fresh, CONSUMER, envelopes).await.unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(fresh.list().await.unwrap(), projection.list().await.unwrap());
}

#[tokio::test]
async fn test_relay_run_loop_feeds_consumer_until_shutdown() {
    let auctions = Arc::new(InMemoryAuctionStore::new());
    let service = AuctionService::new(auctions.clone());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());

    let projection = Arc::new(InMemoryProjectionStore::new());
    let consumer = Arc::new(ProjectionConsumer::new(
        projection.clone(),
        test_consumer_config(),
    ));
    let _dispatcher = start_projection_consumer(bus.clone(), consumer)
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let relay = OutboxRelay::new(auctions.clone(), bus.clone(), relay_config());
    let relay_task = tokio::spawn(async move { relay.run(shutdown_rx).await });

    let mut ids: Vec<Uuid> = Vec::new();
    for _ in 0..5 {
        let outcome = service.handle(create("White", 50)).await.unwrap();
        ids.push(outcome.auction.unwrap().id);
    }

    let all_there = wait_until(Duration::from_secs(5), || {
        let projection = projection.clone();
        let ids = ids.clone();
        async move {
            for id in &ids {
                if projection.get(*id).await.unwrap().is_none() {
                    return false;
                }
            }
            true
        }
    })
    .await;
    assert!(all_there);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), relay_task)
        .await
        .expect("relay should stop after shutdown")
        .unwrap();
}
