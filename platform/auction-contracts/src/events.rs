use chrono::{DateTime, Utc};
use event_bus::DomainEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::status::{AuctionStatus, BidStatus};

/// Closed set of facts the auction service publishes
///
/// Every variant carries a self-sufficient payload: snapshots, not deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AuctionEvent {
    Created(AuctionSnapshot),
    Updated(AuctionSnapshot),
    Deleted(AuctionDeleted),
    Finished(AuctionSnapshot),
    BidPlaced(BidPlaced),
}

impl AuctionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AuctionEvent::Created(_) => EventKind::Created,
            AuctionEvent::Updated(_) => EventKind::Updated,
            AuctionEvent::Deleted(_) => EventKind::Deleted,
            AuctionEvent::Finished(_) => EventKind::Finished,
            AuctionEvent::BidPlaced(_) => EventKind::BidPlaced,
        }
    }

    /// Id of the auction this event is about
    pub fn auction_id(&self) -> Uuid {
        match self {
            AuctionEvent::Created(s) | AuctionEvent::Updated(s) | AuctionEvent::Finished(s) => s.id,
            AuctionEvent::Deleted(d) => d.id,
            AuctionEvent::BidPlaced(b) => b.auction_id,
        }
    }
}

impl DomainEvent for AuctionEvent {
    fn event_kind(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// Discriminant of [`AuctionEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Finished,
    BidPlaced,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Finished => "finished",
            EventKind::BidPlaced => "bid_placed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full state of an auction at the moment of a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub id: Uuid,
    pub reserve_price: i64,
    pub seller: String,
    pub winner: Option<String>,
    pub sold_amount: Option<i64>,
    pub current_high_bid: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub auction_end: DateTime<Utc>,
    pub status: AuctionStatus,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    pub version: i64,
}

impl AuctionSnapshot {
    /// Structural checks every consumer can rely on
    pub fn validate(&self) -> Result<(), ContractError> {
        let text_fields = [
            ("seller", &self.seller),
            ("make", &self.make),
            ("model", &self.model),
            ("color", &self.color),
            ("image_url", &self.image_url),
        ];
        for (name, value) in text_fields {
            if value.trim().is_empty() {
                return Err(ContractError::EmptyField(name));
            }
        }

        if self.year <= 0 {
            return Err(ContractError::OutOfRange("year", self.year as i64));
        }
        if self.mileage < 0 {
            return Err(ContractError::OutOfRange("mileage", self.mileage as i64));
        }
        if self.reserve_price < 0 {
            return Err(ContractError::OutOfRange("reserve_price", self.reserve_price));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionDeleted {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidPlaced {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder: String,
    pub bid_time: DateTime<Utc>,
    pub amount: i64,
    pub bid_status: BidStatus,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{0} out of range: {1}")]
    OutOfRange(&'static str, i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> AuctionSnapshot {
        let now = Utc::now();
        AuctionSnapshot {
            id: Uuid::new_v4(),
            reserve_price: 100,
            seller: "bob".to_string(),
            winner: None,
            sold_amount: None,
            current_high_bid: None,
            created_at: now,
            updated_at: now,
            auction_end: now,
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

    #[test]
    fn test_event_kind_matches_wire_tag() {
        let deleted = AuctionEvent::Deleted(AuctionDeleted { id: Uuid::new_v4() });
        let value = serde_json::to_value(&deleted).unwrap();

        assert_eq!(value["kind"], json!("deleted"));
        assert_eq!(deleted.event_kind(), "deleted");

        let bid = AuctionEvent::BidPlaced(BidPlaced {
            id: Uuid::new_v4(),
            auction_id: Uuid::new_v4(),
            bidder: "alice".to_string(),
            bid_time: Utc::now(),
            amount: 10,
            bid_status: BidStatus::Accepted,
        });
        assert_eq!(serde_json::to_value(&bid).unwrap()["kind"], json!("bid_placed"));
        assert_eq!(bid.event_kind(), "bid_placed");
    }

    #[test]
    fn test_auction_id_for_every_variant() {
        let s = snapshot();
        assert_eq!(AuctionEvent::Updated(s.clone()).auction_id(), s.id);
        assert_eq!(
            AuctionEvent::Deleted(AuctionDeleted { id: s.id }).auction_id(),
            s.id
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let raw = json!({ "kind": "relisted", "data": {} });
        assert!(serde_json::from_value::<AuctionEvent>(raw).is_err());
    }

    #[test]
    fn test_snapshot_validation() {
        assert!(snapshot().validate().is_ok());

        let mut blank_model = snapshot();
        blank_model.model = " ".to_string();
        assert_eq!(
            blank_model.validate(),
            Err(ContractError::EmptyField("model"))
        );

        let mut negative_mileage = snapshot();
        negative_mileage.mileage = -1;
        assert!(negative_mileage.validate().is_err());
    }
}
