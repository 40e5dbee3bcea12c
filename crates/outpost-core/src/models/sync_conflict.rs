//! Sync conflict model

use serde::{Deserialize, Serialize};

/// A mutation the remote store rejected for data-level reasons.
///
/// Conflicts are never retried automatically; an operator resolves them
/// outside the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Mutation that failed to apply
    pub mutation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Rejection reason reported by the remote store or the local checks
    pub error: String,
    /// Snapshot that was being pushed
    pub received_payload: serde_json::Value,
    /// Creation timestamp (unix ms)
    pub timestamp: i64,
    /// Set by external tooling once an operator handled the conflict
    pub resolved: bool,
}
