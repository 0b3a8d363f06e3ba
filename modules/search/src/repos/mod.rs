pub mod failed_repo;
pub mod item_repo;
pub mod processed_repo;
