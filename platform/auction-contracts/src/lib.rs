//! # Auction Contracts
//!
//! Wire contracts for everything the auction service publishes. Producers
//! and consumers both depend on this crate, so adding an event kind is a
//! compile error in every projection that has not handled it yet.

mod events;
mod status;

pub use events::{
    AuctionDeleted, AuctionEvent, AuctionSnapshot, BidPlaced, ContractError, EventKind,
};
pub use status::{AuctionStatus, BidStatus};

/// Module name used in envelopes and subjects
pub const SOURCE_MODULE: &str = "auction";

/// Subscription pattern covering every auction event
pub const AUCTION_EVENTS_PATTERN: &str = "auction.events.>";

/// Envelope type carried on the bus for auction events
pub type AuctionEnvelope = event_bus::EventEnvelope<AuctionEvent>;
