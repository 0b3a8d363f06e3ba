//! Auction service
//!
//! Authoritative record of auctions. Every state change commits together
//! with an outbox record; [`relay::OutboxRelay`] moves those records to the
//! event bus afterwards.

pub mod commands;
pub mod config;
pub mod db;
pub mod memory_store;
pub mod models;
pub mod mutator;
pub mod relay;
pub mod repos;
pub mod service;
pub mod store;

pub use commands::{AuctionCommand, CommandError};
pub use memory_store::InMemoryAuctionStore;
pub use relay::{OutboxRelay, RelayConfig, RelayReport};
pub use service::{AuctionService, CommandOutcome};
pub use store::{AuctionStore, OutboxRecord, OutboxStore, PgAuctionStore, StoreError};
