//! outpost-core - Offline-first sync engine for Outpost
//!
//! This crate contains the entity models, the local `SQLite` store with its
//! mutation log, the local <-> remote field mapping, and the sync service
//! (push, bootstrap, realtime) used by every Outpost client.

pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod models;
pub mod remote;
pub mod services;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{EntityKind, Mutation, MutationId, TenantContext, TenantId};
pub use services::{RealtimeListener, SyncService};
