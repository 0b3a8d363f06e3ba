pub mod auction_repo;
pub mod outbox_repo;
