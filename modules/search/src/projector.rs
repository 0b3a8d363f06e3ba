//! Projection applier
//!
//! Decides what an auction envelope does to the search entry it targets.
//! Pure: the store loads the current entry, calls [`plan`], and writes the
//! result in the same transaction as the ledger row.

use auction_contracts::{AuctionEnvelope, AuctionEvent, AuctionSnapshot};
use uuid::Uuid;

use crate::error::ApplyError;
use crate::models::SearchItem;

/// Model name that is always refused; used to exercise the dead-letter path
pub const REJECTED_MODEL: &str = "Foo";

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionChange {
    Insert(SearchItem),
    Replace(SearchItem),
    Remove(Uuid),
    NoOp(NoOpReason),
}

impl ProjectionChange {
    /// Whether the ledger should record the envelope as done
    ///
    /// An envelope that found no entry can still apply once an earlier
    /// envelope of the same auction is replayed from the dead-letter table.
    pub fn settles_envelope(&self) -> bool {
        !matches!(self, ProjectionChange::NoOp(NoOpReason::MissingEntry))
    }
}

/// Why an envelope left the read model untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// Created for an entry that already exists
    AlreadyExists,
    /// Update, finish or bid for an entry that is not there
    MissingEntry,
    /// Older than what the entry already reflects
    Stale,
    /// Delete for an entry that is already gone
    AlreadyRemoved,
    /// Bid not accepted or not above the current high bid
    BidNotHigher,
}

impl NoOpReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoOpReason::AlreadyExists => "already_exists",
            NoOpReason::MissingEntry => "missing_entry",
            NoOpReason::Stale => "stale",
            NoOpReason::AlreadyRemoved => "already_removed",
            NoOpReason::BidNotHigher => "bid_not_higher",
        }
    }
}

pub fn plan(
    envelope: &AuctionEnvelope,
    current: Option<&SearchItem>,
) -> Result<ProjectionChange, ApplyError> {
    check_envelope(envelope)?;
    let occurred_at = envelope.occurred_at;

    let change = match &envelope.payload {
        AuctionEvent::Created(snapshot) => {
            check_snapshot(snapshot, true)?;
            match current {
                Some(_) => ProjectionChange::NoOp(NoOpReason::AlreadyExists),
                None => ProjectionChange::Insert(SearchItem::from_snapshot(snapshot, occurred_at)),
            }
        }
        AuctionEvent::Updated(snapshot) => {
            check_snapshot(snapshot, true)?;
            overwrite(snapshot, current, envelope)
        }
        AuctionEvent::Finished(snapshot) => {
            check_snapshot(snapshot, false)?;
            overwrite(snapshot, current, envelope)
        }
        AuctionEvent::Deleted(deleted) => match current {
            Some(_) => ProjectionChange::Remove(deleted.id),
            None => ProjectionChange::NoOp(NoOpReason::AlreadyRemoved),
        },
        AuctionEvent::BidPlaced(bid) => match current {
            None => ProjectionChange::NoOp(NoOpReason::MissingEntry),
            Some(item) => {
                let beats_high_bid =
                    !matches!(item.current_high_bid, Some(high) if bid.amount <= high);
                if bid.bid_status.is_accepted() && beats_high_bid {
                    ProjectionChange::Replace(SearchItem {
                        current_high_bid: Some(bid.amount),
                        last_event_at: item.last_event_at.max(occurred_at),
                        ..item.clone()
                    })
                } else {
                    ProjectionChange::NoOp(NoOpReason::BidNotHigher)
                }
            }
        },
    };

    Ok(change)
}

fn overwrite(
    snapshot: &AuctionSnapshot,
    current: Option<&SearchItem>,
    envelope: &AuctionEnvelope,
) -> ProjectionChange {
    match current {
        None => ProjectionChange::NoOp(NoOpReason::MissingEntry),
        Some(item) if envelope.occurred_at < item.last_event_at => {
            ProjectionChange::NoOp(NoOpReason::Stale)
        }
        Some(_) => ProjectionChange::Replace(SearchItem::from_snapshot(
            snapshot,
            envelope.occurred_at,
        )),
    }
}

/// Envelope metadata must agree with the payload it carries
fn check_envelope(envelope: &AuctionEnvelope) -> Result<(), ApplyError> {
    let kind = envelope.payload.kind();
    if envelope.event_kind != kind.as_str() {
        return Err(ApplyError::InvalidPayload(format!(
            "envelope says '{}' but payload is '{}'",
            envelope.event_kind, kind
        )));
    }

    let auction_id = envelope.payload.auction_id().to_string();
    if envelope.aggregate_id != auction_id {
        return Err(ApplyError::InvalidPayload(format!(
            "aggregate_id {} does not match auction {}",
            envelope.aggregate_id, auction_id
        )));
    }

    Ok(())
}

fn check_snapshot(snapshot: &AuctionSnapshot, check_model: bool) -> Result<(), ApplyError> {
    snapshot
        .validate()
        .map_err(|e| ApplyError::InvalidPayload(e.to_string()))?;

    if check_model && snapshot.model == REJECTED_MODEL {
        return Err(ApplyError::InvalidPayload(format!(
            "model '{}' is not accepted",
            REJECTED_MODEL
        )));
    }

    Ok(())
}
