//! Contract for the shared cloud store.
//!
//! The remote side is a tenant-scoped table API: upsert by primary id,
//! filtered reads, and one multiplexed change feed. Transport details live in
//! implementations of [`RemoteStore`].

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::mapping::{row_id, row_tenant_id, row_updated_at, RemoteRow};
use crate::models::EntityKind;

pub use memory::InMemoryRemoteStore;
pub use sqlite::SqliteRemoteStore;

/// Default buffer of the change feed before slow subscribers lag
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// Errors reported by a remote store, split by whether retrying can help
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or infrastructure failure
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time
    #[error("Remote store timed out: {0}")]
    Timeout(String),

    /// Validation or constraint rejection of the data itself
    #[error("Remote store rejected the row ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Unknown remote table: {0}")]
    UnknownTable(String),
}

impl RemoteError {
    /// Transient errors leave a mutation pending for the next cycle
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// What happened to a remote row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One event on the multiplexed change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub table: String,
    pub kind: ChangeKind,
    /// New row for inserts and updates, last known row for deletes
    pub row: RemoteRow,
}

impl RemoteChange {
    pub fn tenant_id(&self) -> Option<&str> {
        row_tenant_id(&self.row)
    }
}

/// Receiving end of the change feed
pub type ChangeFeed = broadcast::Receiver<RemoteChange>;

#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Insert or replace the row with the same primary id
    async fn upsert(&self, table: &str, row: RemoteRow) -> Result<(), RemoteError>;

    /// Current `updated_at` (Unix ms) of a row, `None` when it does not exist
    async fn fetch_updated_at(
        &self,
        table: &str,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<i64>, RemoteError>;

    /// Every row of `table` owned by `tenant_id`
    async fn select_by_tenant(
        &self,
        table: &str,
        tenant_id: &str,
    ) -> Result<Vec<RemoteRow>, RemoteError>;

    /// Open a subscription to changes across all tables
    fn subscribe(&self) -> Result<ChangeFeed, RemoteError>;
}

/// Primary id, tenant, and `updated_at` every stored row must carry
struct RowKeys {
    id: String,
    tenant_id: String,
    updated_at: i64,
}

/// Enforce the columns the remote store treats as NOT NULL
fn validate_row(table: &str, row: &RemoteRow) -> Result<RowKeys, RemoteError> {
    if EntityKind::from_remote_table(table).is_none() {
        return Err(RemoteError::UnknownTable(table.to_string()));
    }

    let id = row_id(row)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| RemoteError::rejected("23502", format!("{table}.id must not be null")))?;
    let tenant_id = row_tenant_id(row)
        .filter(|tenant| !tenant.trim().is_empty())
        .ok_or_else(|| {
            RemoteError::rejected("23502", format!("{table}.tenant_id must not be null"))
        })?;
    let updated_at = row_updated_at(row).ok_or_else(|| {
        RemoteError::rejected("22007", format!("{table}.updated_at is not a valid timestamp"))
    })?;

    Ok(RowKeys {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        updated_at,
    })
}
