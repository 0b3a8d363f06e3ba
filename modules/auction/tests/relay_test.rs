//! Outbox relay behaviour against the in-memory store and a flaky bus

mod common;

use std::sync::Arc;
use std::time::Duration;

use auction_contracts::AuctionEnvelope;
use auction_rs::commands::{AuctionCommand, PlaceBid};
use auction_rs::{AuctionService, InMemoryAuctionStore, OutboxRelay, OutboxStore, RelayReport};
use chrono::Utc;
use common::{create_command, fast_relay_config, FlakyBus};
use event_bus::EventBus;
use futures::StreamExt;
use tokio::sync::watch;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryAuctionStore>,
    bus: Arc<FlakyBus>,
    service: AuctionService<InMemoryAuctionStore>,
    relay: OutboxRelay<InMemoryAuctionStore>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryAuctionStore::new());
    let bus = Arc::new(FlakyBus::new());
    let relay = OutboxRelay::new(
        store.clone(),
        bus.clone() as Arc<dyn EventBus>,
        fast_relay_config(),
    );
    Harness {
        service: AuctionService::new(store.clone()),
        store,
        bus,
        relay,
    }
}

async fn create(h: &Harness) -> Uuid {
    h.service
        .handle(create_command(100))
        .await
        .unwrap()
        .auction
        .unwrap()
        .id
}

async fn bid(h: &Harness, auction_id: Uuid, amount: i64) {
    h.service
        .handle(AuctionCommand::PlaceBid(PlaceBid {
            auction_id,
            bidder: "alice".to_string(),
            amount,
        }))
        .await
        .unwrap();
}

fn decode(payload: &[u8]) -> AuctionEnvelope {
    serde_json::from_slice(payload).unwrap()
}

#[tokio::test]
async fn test_relay_publishes_in_outbox_order_with_routing() {
    let h = harness();
    let a = create(&h).await;
    let b = create(&h).await;
    bid(&h, a, 10).await;
    bid(&h, b, 20).await;

    let report = h.relay.relay_batch().await.unwrap();
    assert_eq!(
        report,
        RelayReport {
            published: 4,
            failed: 0,
            deferred: 0
        }
    );

    let sent = h.bus.accepted();
    let records = h.store.outbox_records().await;
    assert_eq!(sent.len(), 4);

    for (msg, record) in sent.iter().zip(records.iter()) {
        let envelope = decode(&msg.payload);
        assert_eq!(envelope, record.envelope().unwrap());
        assert_eq!(msg.subject, format!("auction.events.{}", envelope.event_kind));
        assert_eq!(msg.partition_key.as_deref(), Some(envelope.aggregate_id.as_str()));
        assert_eq!(
            msg.message_id.as_deref(),
            Some(envelope.envelope_id.to_string().as_str())
        );
        assert!(record.delivered);
        assert!(record.delivered_at.is_some());
    }

    assert!(h.store.fetch_undelivered(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bus_outage_keeps_records_pending_until_recovery() {
    let h = harness();
    create(&h).await;
    create(&h).await;

    h.bus.set_down(true);
    let report = h.relay.relay_batch().await.unwrap();
    assert_eq!(report.published, 0);
    assert_eq!(report.failed, 2);

    let pending = h.store.fetch_undelivered(100).await.unwrap();
    assert_eq!(pending.len(), 2);
    for record in &pending {
        assert_eq!(record.attempt_count, 1);
        assert!(record.last_error.is_some());
    }

    h.bus.set_down(false);
    let report = h.relay.relay_batch().await.unwrap();
    assert_eq!(report.published, 2);
    assert!(h.store.fetch_undelivered(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_aggregate_does_not_block_others() {
    let h = harness();
    let a = create(&h).await;
    let b = create(&h).await;
    bid(&h, a, 10).await;
    bid(&h, b, 20).await;
    bid(&h, a, 30).await;

    h.bus.block_key(&a.to_string());
    let report = h.relay.relay_batch().await.unwrap();

    assert_eq!(report.published, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.deferred, 2);

    let sent: Vec<String> = h
        .bus
        .accepted()
        .iter()
        .map(|m| m.partition_key.clone().unwrap())
        .collect();
    assert_eq!(sent, vec![b.to_string(), b.to_string()]);

    h.bus.unblock_all();
    let report = h.relay.relay_batch().await.unwrap();
    assert_eq!(report.published, 3);

    // Aggregate A arrives in its original order
    let a_kinds: Vec<String> = h
        .bus
        .accepted()
        .iter()
        .filter(|m| m.partition_key.as_deref() == Some(a.to_string().as_str()))
        .map(|m| decode(&m.payload).event_kind)
        .collect();
    assert_eq!(a_kinds, vec!["created", "bid_placed", "bid_placed"]);
}

#[tokio::test]
async fn test_unknown_event_kind_is_relayed_verbatim() {
    let h = harness();
    let stranger = Uuid::new_v4().to_string();
    let body = serde_json::json!({
        "envelope_id": Uuid::new_v4(),
        "aggregate_id": stranger,
        "event_kind": "relisted",
        "payload": { "kind": "relisted", "data": { "id": stranger } }
    });
    let raw_id = h
        .store
        .push_raw_outbox(&stranger, "relisted", body.clone())
        .await;
    let known = create(&h).await;

    let report = h.relay.relay_batch().await.unwrap();
    assert_eq!(report.published, 2);
    assert_eq!(report.failed, 0);

    let sent = h.bus.accepted();
    assert_eq!(sent[0].subject, "auction.events.relisted");
    assert_eq!(sent[0].partition_key.as_deref(), Some(stranger.as_str()));
    assert_eq!(sent[0].message_id, Some(raw_id.to_string()));
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&sent[0].payload).unwrap(),
        body
    );
    assert_eq!(sent[1].partition_key, Some(known.to_string()));
    assert!(h.store.fetch_undelivered(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmarked_publish_is_sent_again() {
    let h = harness();
    create(&h).await;

    h.store.fail_mark_delivered(1);
    let first = h.relay.relay_batch().await.unwrap();
    assert_eq!(first.failed, 1);

    let second = h.relay.relay_batch().await.unwrap();
    assert_eq!(second.published, 1);

    let sent = h.bus.accepted();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].message_id, sent[1].message_id);
    assert_eq!(decode(&sent[0].payload), decode(&sent[1].payload));
}

#[tokio::test]
async fn test_publish_retries_within_a_tick() {
    let h = harness();
    create(&h).await;

    h.bus.set_down(true);
    h.relay.relay_batch().await.unwrap();

    // fast_relay_config allows two attempts per record per tick
    assert_eq!(h.bus.attempts(), 2);
}

#[tokio::test]
async fn test_store_outage_surfaces_from_batch() {
    let h = harness();
    create(&h).await;

    h.store.set_unavailable(true);
    assert!(h.relay.relay_batch().await.is_err());
    assert!(h.bus.accepted().is_empty());
}

#[tokio::test]
async fn test_purge_drops_only_old_delivered_records() {
    let h = harness();
    create(&h).await;
    h.relay.relay_batch().await.unwrap();
    create(&h).await;

    let future_cutoff = Utc::now() + chrono::Duration::seconds(60);
    let purged = h.store.purge_delivered(future_cutoff).await.unwrap();

    assert_eq!(purged, 1);
    let remaining = h.store.outbox_records().await;
    assert_eq!(remaining.len(), 1);
    assert!(!remaining[0].delivered);
}

#[tokio::test]
async fn test_run_loop_delivers_and_stops_on_shutdown() {
    let h = harness();
    let mut stream = h.bus.subscribe("auction.events.>").await.unwrap();
    let id = create(&h).await;

    let relay = Arc::new(h.relay);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.run(shutdown_rx).await })
    };

    let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("relay did not publish in time")
        .expect("stream ended");
    assert_eq!(msg.partition_key, Some(id.to_string()));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("relay did not stop")
        .unwrap();
}
