//! Search service
//!
//! Keeps a search-optimized copy of auctions in sync with the auction
//! service's event stream. Each envelope is applied at most once per consumer
//! (idempotency ledger), per-auction order is preserved by lane routing, and
//! envelopes that cannot be applied end up in the dead-letter table.

pub mod config;
pub mod consumer;
pub mod db;
pub mod dlq;
pub mod error;
pub mod memory_store;
pub mod models;
pub mod projector;
pub mod rebuild;
pub mod repos;
pub mod store;

pub use consumer::{start_projection_consumer, ConsumerConfig, ProjectionConsumer};
pub use dlq::FailedEvent;
pub use error::ApplyError;
pub use memory_store::InMemoryProjectionStore;
pub use models::SearchItem;
pub use rebuild::{rebuild, RebuildReport};
pub use store::{ApplyOutcome, PgProjectionStore, ProjectionStore};
