//! Commands accepted by the auction service
//!
//! Field validation lives here; rules that depend on current state (status,
//! versions, high bids) live in the mutator.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum AuctionCommand {
    Create(CreateAuction),
    Update(UpdateAuction),
    Delete(DeleteAuction),
    Finish(FinishAuction),
    PlaceBid(PlaceBid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateAuction {
    pub seller: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    pub reserve_price: i64,
    pub auction_end: DateTime<Utc>,
}

/// Partial update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateAuction {
    pub auction_id: Uuid,
    pub expected_version: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub mileage: Option<i32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteAuction {
    pub auction_id: Uuid,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishAuction {
    pub auction_id: Uuid,
    pub item_sold: bool,
    pub winner: Option<String>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceBid {
    pub auction_id: Uuid,
    pub bidder: String,
    pub amount: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("auction {0} not found")]
    NotFound(Uuid),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CommandError::Conflict(msg),
            other => CommandError::Store(other),
        }
    }
}

impl AuctionCommand {
    /// Auction the command targets; `None` for creation
    pub fn auction_id(&self) -> Option<Uuid> {
        match self {
            AuctionCommand::Create(_) => None,
            AuctionCommand::Update(c) => Some(c.auction_id),
            AuctionCommand::Delete(c) => Some(c.auction_id),
            AuctionCommand::Finish(c) => Some(c.auction_id),
            AuctionCommand::PlaceBid(c) => Some(c.auction_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuctionCommand::Create(_) => "create",
            AuctionCommand::Update(_) => "update",
            AuctionCommand::Delete(_) => "delete",
            AuctionCommand::Finish(_) => "finish",
            AuctionCommand::PlaceBid(_) => "place_bid",
        }
    }

    /// Checks that need nothing but the command itself
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CommandError> {
        match self {
            AuctionCommand::Create(c) => {
                require_text("seller", &c.seller)?;
                require_text("make", &c.make)?;
                require_text("model", &c.model)?;
                require_text("color", &c.color)?;
                require_text("image_url", &c.image_url)?;
                require_year(c.year)?;
                require_mileage(c.mileage)?;
                if c.reserve_price < 0 {
                    return Err(CommandError::Validation(
                        "reserve_price cannot be negative".to_string(),
                    ));
                }
                if c.auction_end <= now {
                    return Err(CommandError::Validation(
                        "auction_end must be in the future".to_string(),
                    ));
                }
                Ok(())
            }
            AuctionCommand::Update(c) => {
                if c.make.is_none()
                    && c.model.is_none()
                    && c.color.is_none()
                    && c.mileage.is_none()
                    && c.year.is_none()
                {
                    return Err(CommandError::Validation(
                        "update must change at least one field".to_string(),
                    ));
                }
                if let Some(make) = &c.make {
                    require_text("make", make)?;
                }
                if let Some(model) = &c.model {
                    require_text("model", model)?;
                }
                if let Some(color) = &c.color {
                    require_text("color", color)?;
                }
                if let Some(year) = c.year {
                    require_year(year)?;
                }
                if let Some(mileage) = c.mileage {
                    require_mileage(mileage)?;
                }
                Ok(())
            }
            AuctionCommand::Delete(_) => Ok(()),
            AuctionCommand::Finish(c) => {
                if !c.item_sold {
                    return Ok(());
                }
                match (&c.winner, c.amount) {
                    (Some(winner), Some(amount)) if !winner.trim().is_empty() && amount > 0 => {
                        Ok(())
                    }
                    _ => Err(CommandError::Validation(
                        "a sold item needs a winner and a positive amount".to_string(),
                    )),
                }
            }
            AuctionCommand::PlaceBid(c) => {
                require_text("bidder", &c.bidder)?;
                if c.amount <= 0 {
                    return Err(CommandError::Validation(
                        "bid amount must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn require_year(year: i32) -> Result<(), CommandError> {
    if year <= 0 {
        return Err(CommandError::Validation(format!("invalid year {}", year)));
    }
    Ok(())
}

fn require_mileage(mileage: i32) -> Result<(), CommandError> {
    if mileage < 0 {
        return Err(CommandError::Validation(
            "mileage cannot be negative".to_string(),
        ));
    }
    Ok(())
}
