//! Sync engine services built on the local database and a remote store

pub mod realtime;
pub mod sync;

pub use realtime::{ListenerHandle, RealtimeListener};
pub use sync::{ApplyOutcome, BootstrapReport, PushReport, SyncService, TableReport};
