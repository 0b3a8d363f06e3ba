//! Aggregate mutator
//!
//! Pure decision step: given a command and the current state, produce the
//! new state and the envelope describing it, or reject. Nothing here touches
//! storage or the bus; the store commits a [`Mutation`] atomically.

use auction_contracts::{
    AuctionDeleted, AuctionEnvelope, AuctionEvent, AuctionStatus, BidPlaced, BidStatus,
    SOURCE_MODULE,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use event_bus::EventEnvelope;
use uuid::Uuid;

use crate::commands::{
    AuctionCommand, CommandError, CreateAuction, FinishAuction, PlaceBid, UpdateAuction,
};
use crate::models::{settle_status, Auction, Item};

/// Row-level change the store must apply together with the outbox insert
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Insert(Auction),
    /// Conditional on the stored row still being at `expected_version`
    Update {
        auction: Auction,
        expected_version: i64,
    },
    Delete {
        id: Uuid,
        expected_version: i64,
    },
}

impl StateChange {
    pub fn auction_id(&self) -> Uuid {
        match self {
            StateChange::Insert(a) => a.id,
            StateChange::Update { auction, .. } => auction.id,
            StateChange::Delete { id, .. } => *id,
        }
    }

    /// New state after the change; `None` once deleted
    pub fn resulting_auction(&self) -> Option<&Auction> {
        match self {
            StateChange::Insert(a) => Some(a),
            StateChange::Update { auction, .. } => Some(auction),
            StateChange::Delete { .. } => None,
        }
    }
}

/// A decided change plus the single envelope that announces it
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub change: StateChange,
    pub envelope: AuctionEnvelope,
}

/// Decide the effect of `cmd` on `current`
///
/// Returns `Ok(None)` for an accepted command that changes nothing (an
/// update whose merged values equal the current ones). Such a command must
/// not produce an envelope.
pub fn decide(
    cmd: &AuctionCommand,
    current: Option<&Auction>,
    now: DateTime<Utc>,
) -> Result<Option<Mutation>, CommandError> {
    cmd.validate(now)?;

    let current = match (cmd, current) {
        (AuctionCommand::Create(create), None) => return Ok(Some(create_auction(create, now))),
        (AuctionCommand::Create(_), Some(existing)) => {
            return Err(CommandError::Conflict(format!(
                "auction {} already exists",
                existing.id
            )))
        }
        (_, None) => {
            return Err(CommandError::NotFound(
                cmd.auction_id().unwrap_or_else(Uuid::nil),
            ))
        }
        (_, Some(current)) => current,
    };

    let occurred_at = next_occurred_at(current, now);

    match cmd {
        // handled above
        AuctionCommand::Create(_) => Ok(None),
        AuctionCommand::Update(update) => {
            check_version(update.expected_version, current)?;
            Ok(update_auction(update, current, occurred_at))
        }
        AuctionCommand::Delete(delete) => {
            check_version(delete.expected_version, current)?;
            let payload = AuctionEvent::Deleted(AuctionDeleted { id: current.id });
            Ok(Some(Mutation {
                change: StateChange::Delete {
                    id: current.id,
                    expected_version: current.version,
                },
                envelope: envelope_for(current.id, payload, occurred_at),
            }))
        }
        AuctionCommand::Finish(finish) => finish_auction(finish, current, occurred_at).map(Some),
        AuctionCommand::PlaceBid(bid) => place_bid(bid, current, now, occurred_at).map(Some),
    }
}

fn create_auction(cmd: &CreateAuction, now: DateTime<Utc>) -> Mutation {
    let now = now.trunc_subsecs(6);
    let auction = Auction {
        id: Uuid::new_v4(),
        reserve_price: cmd.reserve_price,
        seller: cmd.seller.clone(),
        winner: None,
        sold_amount: None,
        current_high_bid: None,
        created_at: now,
        updated_at: now,
        auction_end: cmd.auction_end.trunc_subsecs(6),
        status: AuctionStatus::Live,
        item: Item {
            make: cmd.make.clone(),
            model: cmd.model.clone(),
            year: cmd.year,
            color: cmd.color.clone(),
            mileage: cmd.mileage,
            image_url: cmd.image_url.clone(),
        },
        version: 1,
    };

    let envelope = envelope_for(auction.id, AuctionEvent::Created(auction.snapshot()), now);
    Mutation {
        change: StateChange::Insert(auction),
        envelope,
    }
}

fn update_auction(
    cmd: &UpdateAuction,
    current: &Auction,
    occurred_at: DateTime<Utc>,
) -> Option<Mutation> {
    let item = Item {
        make: cmd.make.clone().unwrap_or_else(|| current.item.make.clone()),
        model: cmd.model.clone().unwrap_or_else(|| current.item.model.clone()),
        year: cmd.year.unwrap_or(current.item.year),
        color: cmd.color.clone().unwrap_or_else(|| current.item.color.clone()),
        mileage: cmd.mileage.unwrap_or(current.item.mileage),
        image_url: current.item.image_url.clone(),
    };

    if item == current.item {
        return None;
    }

    let auction = Auction {
        item,
        ..advance(current, occurred_at)
    };
    let envelope = envelope_for(
        auction.id,
        AuctionEvent::Updated(auction.snapshot()),
        occurred_at,
    );

    Some(Mutation {
        change: StateChange::Update {
            auction,
            expected_version: current.version,
        },
        envelope,
    })
}

fn finish_auction(
    cmd: &FinishAuction,
    current: &Auction,
    occurred_at: DateTime<Utc>,
) -> Result<Mutation, CommandError> {
    if current.status != AuctionStatus::Live {
        return Err(CommandError::Conflict(format!(
            "auction {} is already {}",
            current.id, current.status
        )));
    }

    let (winner, sold_amount) = if cmd.item_sold {
        (cmd.winner.clone(), cmd.amount)
    } else {
        (None, None)
    };

    let auction = Auction {
        status: settle_status(sold_amount, current.reserve_price),
        winner,
        sold_amount,
        ..advance(current, occurred_at)
    };
    let envelope = envelope_for(
        auction.id,
        AuctionEvent::Finished(auction.snapshot()),
        occurred_at,
    );

    Ok(Mutation {
        change: StateChange::Update {
            auction,
            expected_version: current.version,
        },
        envelope,
    })
}

fn place_bid(
    cmd: &PlaceBid,
    current: &Auction,
    now: DateTime<Utc>,
    occurred_at: DateTime<Utc>,
) -> Result<Mutation, CommandError> {
    if !current.is_open_at(now) {
        return Err(CommandError::Conflict(format!(
            "auction {} is not taking bids",
            current.id
        )));
    }

    if let Some(high_bid) = current.current_high_bid {
        if cmd.amount <= high_bid {
            return Err(CommandError::Validation(format!(
                "bid {} does not beat current high bid {}",
                cmd.amount, high_bid
            )));
        }
    }

    let bid_status = if cmd.amount > current.reserve_price {
        BidStatus::Accepted
    } else {
        BidStatus::AcceptedBelowReserve
    };

    let auction = Auction {
        current_high_bid: Some(cmd.amount),
        ..advance(current, occurred_at)
    };
    let payload = AuctionEvent::BidPlaced(BidPlaced {
        id: Uuid::new_v4(),
        auction_id: auction.id,
        bidder: cmd.bidder.clone(),
        bid_time: occurred_at,
        amount: cmd.amount,
        bid_status,
    });

    Ok(Mutation {
        envelope: envelope_for(auction.id, payload, occurred_at),
        change: StateChange::Update {
            auction,
            expected_version: current.version,
        },
    })
}

fn check_version(expected: Option<i64>, current: &Auction) -> Result<(), CommandError> {
    match expected {
        Some(expected) if expected != current.version => Err(CommandError::VersionConflict {
            expected,
            actual: current.version,
        }),
        _ => Ok(()),
    }
}

/// Copy of `current` with the bookkeeping every change shares
fn advance(current: &Auction, occurred_at: DateTime<Utc>) -> Auction {
    Auction {
        updated_at: occurred_at,
        version: current.version + 1,
        ..current.clone()
    }
}

/// Microsecond timestamp strictly after the aggregate's last change
///
/// Postgres stores microseconds, so sub-microsecond precision is dropped
/// before comparing. A clock that has not moved past `updated_at` is bumped.
fn next_occurred_at(current: &Auction, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    if now > current.updated_at {
        now
    } else {
        current.updated_at + Duration::microseconds(1)
    }
}

fn envelope_for(id: Uuid, payload: AuctionEvent, occurred_at: DateTime<Utc>) -> AuctionEnvelope {
    EventEnvelope::new(id.to_string(), SOURCE_MODULE.to_string(), payload)
        .with_occurred_at(occurred_at)
        .with_source_version(env!("CARGO_PKG_VERSION").to_string())
}
