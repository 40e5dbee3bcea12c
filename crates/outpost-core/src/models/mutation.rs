//! Mutation log model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for a mutation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Create a new unique mutation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of local write a mutation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

impl MutationOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for MutationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unknown mutation operation: {other}"
            ))),
        }
    }
}

/// Position of a mutation in the push state machine.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Synced,
    DiscardedStale,
    Conflict,
    Quarantined,
    /// The entity type is not registered in this build
    Skipped,
}

impl MutationStatus {
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Synced,
        Self::DiscardedStale,
        Self::Conflict,
        Self::Quarantined,
        Self::Skipped,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::DiscardedStale => "discarded_stale",
            Self::Conflict => "conflict",
            Self::Quarantined => "quarantined",
            Self::Skipped => "skipped",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown mutation status: {s}")))
    }
}

/// A durable record of a local write waiting to reach the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: MutationId,
    /// Tenant whose session produced the write
    pub tenant_id: String,
    /// Registry name of the entity type; may be unknown to this build
    pub entity_type: String,
    pub entity_id: String,
    pub operation: MutationOperation,
    /// Entity snapshot in its local representation
    pub payload: serde_json::Value,
    /// Enqueue time (Unix ms)
    pub timestamp: i64,
    pub synced: bool,
    pub retry_count: u32,
    pub status: MutationStatus,
    /// Most recent transient push error, if any
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_id_parse() {
        let id = MutationId::new();
        let parsed: MutationId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn operation_strings_round_trip() {
        for op in [
            MutationOperation::Create,
            MutationOperation::Update,
            MutationOperation::Delete,
        ] {
            assert_eq!(op.as_str().parse::<MutationOperation>().unwrap(), op);
        }
        assert!("UPSERT".parse::<MutationOperation>().is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        for status in MutationStatus::ALL {
            assert_eq!(status.is_terminal(), status != MutationStatus::Pending);
            assert_eq!(status.as_str().parse::<MutationStatus>().unwrap(), status);
        }
    }
}
