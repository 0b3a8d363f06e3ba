use std::sync::Arc;

use auction_contracts::AuctionEnvelope;
use chrono::{DateTime, Utc};

use crate::commands::{AuctionCommand, CommandError};
use crate::models::Auction;
use crate::mutator::decide;
use crate::store::AuctionStore;

/// Result of a handled command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// State after the command; `None` after a delete
    pub auction: Option<Auction>,
    /// Envelope committed to the outbox; `None` for a no-op update
    pub envelope: Option<AuctionEnvelope>,
}

/// Command intake for the auction aggregate
///
/// Reads current state, lets the mutator decide, commits state plus outbox
/// record atomically. The bus is never touched here; the relay publishes
/// later.
pub struct AuctionService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AuctionStore + ?Sized> AuctionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: AuctionCommand) -> Result<CommandOutcome, CommandError> {
        self.handle_at(cmd, Utc::now()).await
    }

    /// Handle a command as if the clock read `now`
    pub async fn handle_at(
        &self,
        cmd: AuctionCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, CommandError> {
        let current = match cmd.auction_id() {
            Some(id) => self.store.get(id).await?,
            None => None,
        };

        let Some(mutation) = decide(&cmd, current.as_ref(), now)? else {
            tracing::debug!(
                command = cmd.name(),
                auction_id = ?cmd.auction_id(),
                "Command changed nothing; no event written"
            );
            return Ok(CommandOutcome {
                auction: current,
                envelope: None,
            });
        };

        self.store
            .commit(&mutation.change, &mutation.envelope)
            .await
            .map_err(|e| {
                tracing::warn!(
                    command = cmd.name(),
                    aggregate_id = %mutation.envelope.aggregate_id,
                    error = %e,
                    "Command commit failed"
                );
                CommandError::from(e)
            })?;

        tracing::info!(
            command = cmd.name(),
            envelope_id = %mutation.envelope.envelope_id,
            aggregate_id = %mutation.envelope.aggregate_id,
            event_kind = %mutation.envelope.event_kind,
            "Command committed"
        );

        Ok(CommandOutcome {
            auction: mutation.change.resulting_auction().cloned(),
            envelope: Some(mutation.envelope),
        })
    }
}
