//! Local persistence for Outpost

mod conflict_repository;
mod connection;
mod entity_store;
mod migrations;
mod mutation_queue;

pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use connection::Database;
pub use entity_store::{EntityStore, SqliteEntityStore};
pub use mutation_queue::{MutationQueue, SqliteMutationQueue};
