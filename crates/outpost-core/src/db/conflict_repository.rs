//! Durable log of mutations the remote store rejected

#![allow(clippy::cast_possible_wrap)]

use crate::error::{Error, Result};
use crate::models::{now_millis, Mutation, MutationId, SyncConflict};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for conflict log operations
pub trait ConflictRepository {
    /// Record a data-level push failure for `mutation`
    fn record(&self, mutation: &Mutation, error: &str) -> Result<SyncConflict>;

    /// List recent conflicts, newest first
    fn list(&self, limit: usize, unresolved_only: bool) -> Result<Vec<SyncConflict>>;

    /// Get a conflict by its row id
    fn get(&self, id: i64) -> Result<Option<SyncConflict>>;

    /// Number of conflicts recorded against a mutation
    fn count_for_mutation(&self, mutation_id: &MutationId) -> Result<usize>;

    /// Flag a conflict as handled by an operator
    fn mark_resolved(&self, id: i64) -> Result<()>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
        let payload: String = row.get(5)?;
        Ok(SyncConflict {
            id: row.get(0)?,
            mutation_id: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            error: row.get(4)?,
            received_payload: serde_json::from_str(&payload).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?,
            timestamp: row.get(6)?,
            resolved: row.get::<_, i32>(7)? != 0,
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn record(&self, mutation: &Mutation, error: &str) -> Result<SyncConflict> {
        let timestamp = now_millis();
        self.conn.execute(
            "INSERT INTO sync_conflicts (mutation_id, entity_type, entity_id, error, received_payload, timestamp, resolved)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
            params![
                mutation.id.as_str(),
                mutation.entity_type,
                mutation.entity_id,
                error,
                serde_json::to_string(&mutation.payload)?,
                timestamp
            ],
        )?;

        let conflict = SyncConflict {
            id: self.conn.last_insert_rowid(),
            mutation_id: mutation.id.to_string(),
            entity_type: mutation.entity_type.clone(),
            entity_id: mutation.entity_id.clone(),
            error: error.to_string(),
            received_payload: mutation.payload.clone(),
            timestamp,
            resolved: false,
        };

        tracing::warn!(
            conflict_id = conflict.id,
            mutation_id = %mutation.id,
            entity_type = %mutation.entity_type,
            entity_id = %mutation.entity_id,
            "Recorded sync conflict: {error}"
        );
        Ok(conflict)
    }

    fn list(&self, limit: usize, unresolved_only: bool) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, mutation_id, entity_type, entity_id, error, received_payload, timestamp, resolved
             FROM sync_conflicts
             WHERE (? = 0 OR resolved = 0)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(
                params![i32::from(unresolved_only), limit as i64],
                Self::parse_conflict,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }

    fn get(&self, id: i64) -> Result<Option<SyncConflict>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, mutation_id, entity_type, entity_id, error, received_payload, timestamp, resolved
                 FROM sync_conflicts WHERE id = ?",
                params![id],
                Self::parse_conflict,
            )
            .optional()?)
    }

    fn count_for_mutation(&self, mutation_id: &MutationId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE mutation_id = ?",
            params![mutation_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn mark_resolved(&self, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_conflicts SET resolved = 1 WHERE id = ?",
            params![id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("sync conflict {id}")));
        }
        Ok(())
    }
}
