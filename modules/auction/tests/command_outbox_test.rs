//! Command handling against the in-memory store
//!
//! Covers the write side: every committed change has exactly one outbox
//! record, and a failure anywhere leaves neither behind.

mod common;

use std::sync::Arc;

use auction_contracts::{AuctionEvent, AuctionStatus};
use auction_rs::commands::{AuctionCommand, DeleteAuction, PlaceBid, UpdateAuction};
use auction_rs::{AuctionService, AuctionStore, CommandError, InMemoryAuctionStore};
use common::{create_command, finish_command};
use uuid::Uuid;

fn service() -> (Arc<InMemoryAuctionStore>, AuctionService<InMemoryAuctionStore>) {
    let store = Arc::new(InMemoryAuctionStore::new());
    (store.clone(), AuctionService::new(store))
}

#[tokio::test]
async fn test_create_writes_state_and_one_outbox_record() {
    let (store, service) = service();

    let outcome = service.handle(create_command(100)).await.unwrap();
    let auction = outcome.auction.unwrap();
    let envelope = outcome.envelope.unwrap();

    assert_eq!(store.get(auction.id).await.unwrap(), Some(auction.clone()));

    let records = store.outbox_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].envelope().unwrap(), envelope);
    assert!(!records[0].delivered);
    assert_eq!(envelope.aggregate_id, auction.id.to_string());
    assert!(matches!(envelope.payload, AuctionEvent::Created(ref s) if s.id == auction.id));
}

#[tokio::test]
async fn test_failed_outbox_write_leaves_no_state() {
    let (store, service) = service();
    store.set_fail_outbox_write(true);

    let result = service.handle(create_command(100)).await;

    assert!(matches!(result, Err(CommandError::Store(_))));
    assert_eq!(store.auction_count().await, 0);
    assert!(store.outbox_records().await.is_empty());
}

#[tokio::test]
async fn test_failed_outbox_write_keeps_previous_version() {
    let (store, service) = service();
    let auction = service
        .handle(create_command(100))
        .await
        .unwrap()
        .auction
        .unwrap();

    store.set_fail_outbox_write(true);
    let result = service
        .handle(AuctionCommand::Update(UpdateAuction {
            auction_id: auction.id,
            color: Some("Red".to_string()),
            ..Default::default()
        }))
        .await;
    assert!(result.is_err());

    let stored = store.get(auction.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.item.color, "White");
    assert_eq!(store.outbox_records().await.len(), 1);
}

#[tokio::test]
async fn test_unavailable_store_rejects_commands() {
    let (store, service) = service();
    store.set_unavailable(true);

    assert!(matches!(
        service.handle(create_command(100)).await,
        Err(CommandError::Store(_))
    ));
}

#[tokio::test]
async fn test_noop_update_writes_nothing() {
    let (store, service) = service();
    let auction = service
        .handle(create_command(100))
        .await
        .unwrap()
        .auction
        .unwrap();

    let outcome = service
        .handle(AuctionCommand::Update(UpdateAuction {
            auction_id: auction.id,
            model: Some("GT".to_string()),
            ..Default::default()
        }))
        .await
        .unwrap();

    assert!(outcome.envelope.is_none());
    assert_eq!(outcome.auction, Some(auction));
    assert_eq!(store.outbox_records().await.len(), 1);
}

#[tokio::test]
async fn test_stale_expected_version_is_rejected() {
    let (store, service) = service();
    let auction = service
        .handle(create_command(100))
        .await
        .unwrap()
        .auction
        .unwrap();

    service
        .handle(AuctionCommand::Update(UpdateAuction {
            auction_id: auction.id,
            expected_version: Some(1),
            mileage: Some(51_000),
            ..Default::default()
        }))
        .await
        .unwrap();

    let result = service
        .handle(AuctionCommand::Update(UpdateAuction {
            auction_id: auction.id,
            expected_version: Some(1),
            mileage: Some(52_000),
            ..Default::default()
        }))
        .await;

    assert!(matches!(
        result,
        Err(CommandError::VersionConflict {
            expected: 1,
            actual: 2
        })
    ));
    assert_eq!(store.outbox_records().await.len(), 2);
}

#[tokio::test]
async fn test_finish_status_follows_reserve() {
    let (_store, service) = service();
    let cases = [
        (Some(150), AuctionStatus::Finished),
        (Some(80), AuctionStatus::ReserveNotMet),
        (Some(100), AuctionStatus::ReserveNotMet),
        (None, AuctionStatus::ReserveNotMet),
    ];

    for (amount, expected) in cases {
        let auction = service
            .handle(create_command(100))
            .await
            .unwrap()
            .auction
            .unwrap();

        let outcome = service
            .handle(finish_command(auction.id, amount))
            .await
            .unwrap();

        assert_eq!(outcome.auction.unwrap().status, expected, "amount {:?}", amount);
        match outcome.envelope.unwrap().payload {
            AuctionEvent::Finished(snapshot) => assert_eq!(snapshot.status, expected),
            other => panic!("expected Finished, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_delete_removes_state_and_emits_deleted() {
    let (store, service) = service();
    let auction = service
        .handle(create_command(100))
        .await
        .unwrap()
        .auction
        .unwrap();

    let outcome = service
        .handle(AuctionCommand::Delete(DeleteAuction {
            auction_id: auction.id,
            expected_version: None,
        }))
        .await
        .unwrap();

    assert!(outcome.auction.is_none());
    assert_eq!(outcome.envelope.unwrap().event_kind, "deleted");
    assert_eq!(store.get(auction.id).await.unwrap(), None);

    let again = service
        .handle(AuctionCommand::Delete(DeleteAuction {
            auction_id: auction.id,
            expected_version: None,
        }))
        .await;
    assert!(matches!(again, Err(CommandError::NotFound(_))));
}

#[tokio::test]
async fn test_bid_on_missing_auction_is_not_found() {
    let (_store, service) = service();

    let result = service
        .handle(AuctionCommand::PlaceBid(PlaceBid {
            auction_id: Uuid::new_v4(),
            bidder: "alice".to_string(),
            amount: 10,
        }))
        .await;

    assert!(matches!(result, Err(CommandError::NotFound(_))));
}

#[tokio::test]
async fn test_envelopes_of_one_auction_are_ordered() {
    let (store, service) = service();
    let auction = service
        .handle(create_command(100))
        .await
        .unwrap()
        .auction
        .unwrap();

    for amount in [10, 20, 30] {
        service
            .handle(AuctionCommand::PlaceBid(PlaceBid {
                auction_id: auction.id,
                bidder: "alice".to_string(),
                amount,
            }))
            .await
            .unwrap();
    }

    let records = store.outbox_records().await;
    assert_eq!(records.len(), 4);
    for pair in records.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
        let (earlier, later) = (pair[0].envelope().unwrap(), pair[1].envelope().unwrap());
        assert!(earlier.occurred_at < later.occurred_at);
    }
}
