use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    Live,
    Finished,
    ReserveNotMet,
}

impl AuctionStatus {
    /// Status an auction settles into once bidding closes
    ///
    /// Sold amount must be strictly greater than the reserve. An auction
    /// settling exactly at its reserve has not met it.
    pub fn settle(sold_amount: Option<i64>, reserve_price: i64) -> Self {
        match sold_amount {
            Some(amount) if amount > reserve_price => AuctionStatus::Finished,
            _ => AuctionStatus::ReserveNotMet,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Live => "Live",
            AuctionStatus::Finished => "Finished",
            AuctionStatus::ReserveNotMet => "ReserveNotMet",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Live" => Ok(AuctionStatus::Live),
            "Finished" => Ok(AuctionStatus::Finished),
            "ReserveNotMet" => Ok(AuctionStatus::ReserveNotMet),
            other => Err(format!("unknown auction status '{}'", other)),
        }
    }
}

/// Outcome the bidding side assigned to a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidStatus {
    Accepted,
    AcceptedBelowReserve,
    TooLow,
    Finished,
}

impl BidStatus {
    /// Whether the bid became the auction's high bid
    pub fn is_accepted(&self) -> bool {
        matches!(self, BidStatus::Accepted | BidStatus::AcceptedBelowReserve)
    }
}
