use auction_contracts::{AuctionSnapshot, AuctionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One auction as the search index sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
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
    /// `occurred_at` of the last envelope applied to this entry
    pub last_event_at: DateTime<Utc>,
}

impl SearchItem {
    pub fn from_snapshot(snapshot: &AuctionSnapshot, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: snapshot.id,
            reserve_price: snapshot.reserve_price,
            seller: snapshot.seller.clone(),
            winner: snapshot.winner.clone(),
            sold_amount: snapshot.sold_amount,
            current_high_bid: snapshot.current_high_bid,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            auction_end: snapshot.auction_end,
            status: snapshot.status,
            make: snapshot.make.clone(),
            model: snapshot.model.clone(),
            year: snapshot.year,
            color: snapshot.color.clone(),
            mileage: snapshot.mileage,
            image_url: snapshot.image_url.clone(),
            last_event_at: occurred_at,
        }
    }
}
