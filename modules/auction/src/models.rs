use auction_contracts::{AuctionSnapshot, AuctionStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The vehicle being sold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
}

/// Authoritative auction aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct Auction {
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
    pub item: Item,
    /// Incremented on every committed change
    pub version: i64,
}

impl Auction {
    pub fn has_reserve_price(&self) -> bool {
        self.reserve_price > 0
    }

    /// Whether bids are still taken at `now`
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Live && now < self.auction_end
    }

    /// Complete copy of the current state for event payloads
    pub fn snapshot(&self) -> AuctionSnapshot {
        AuctionSnapshot {
            id: self.id,
            reserve_price: self.reserve_price,
            seller: self.seller.clone(),
            winner: self.winner.clone(),
            sold_amount: self.sold_amount,
            current_high_bid: self.current_high_bid,
            created_at: self.created_at,
            updated_at: self.updated_at,
            auction_end: self.auction_end,
            status: self.status,
            make: self.item.make.clone(),
            model: self.item.model.clone(),
            year: self.item.year,
            color: self.item.color.clone(),
            mileage: self.item.mileage,
            image_url: self.item.image_url.clone(),
            version: self.version,
        }
    }
}

/// Final status of an auction given what it sold for
///
/// `Finished` only when the sold amount is strictly above the reserve.
pub fn settle_status(sold_amount: Option<i64>, reserve_price: i64) -> AuctionStatus {
    AuctionStatus::settle(sold_amount, reserve_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn auction(reserve_price: i64) -> Auction {
        let now = Utc::now();
        Auction {
            id: Uuid::new_v4(),
            reserve_price,
            seller: "bob".to_string(),
            winner: None,
            sold_amount: None,
            current_high_bid: None,
            created_at: now,
            updated_at: now,
            auction_end: now + Duration::days(7),
            status: AuctionStatus::Live,
            item: Item {
                make: "Ford".to_string(),
                model: "GT".to_string(),
                year: 2020,
                color: "White".to_string(),
                mileage: 50_000,
                image_url: "https://cdn.example/gt.jpg".to_string(),
            },
            version: 1,
        }
    }

    #[test]
    fn test_has_reserve_price_true() {
        assert!(auction(10).has_reserve_price());
    }

    #[test]
    fn test_has_reserve_price_zero_is_false() {
        assert!(!auction(0).has_reserve_price());
    }

    #[test]
    fn test_settle_status_strictly_above_reserve() {
        assert_eq!(settle_status(Some(150), 100), AuctionStatus::Finished);
        assert_eq!(settle_status(Some(80), 100), AuctionStatus::ReserveNotMet);
        assert_eq!(settle_status(Some(100), 100), AuctionStatus::ReserveNotMet);
        assert_eq!(settle_status(None, 100), AuctionStatus::ReserveNotMet);
    }

    #[test]
    fn test_snapshot_copies_item_fields() {
        let a = auction(100);
        let snapshot = a.snapshot();

        assert_eq!(snapshot.id, a.id);
        assert_eq!(snapshot.make, "Ford");
        assert_eq!(snapshot.version, 1);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_is_open_at() {
        let mut a = auction(100);
        assert!(a.is_open_at(Utc::now()));
        assert!(!a.is_open_at(a.auction_end));

        a.status = AuctionStatus::Finished;
        assert!(!a.is_open_at(Utc::now()));
    }
}
