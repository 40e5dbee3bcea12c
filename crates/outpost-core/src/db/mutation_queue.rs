//! Durable queue of local writes awaiting push

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::mapping::payload_entity_id;
use crate::models::{
    now_millis, EntityKind, Mutation, MutationId, MutationOperation, MutationStatus, TenantId,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Trait for mutation log operations
pub trait MutationQueue {
    /// Append a pending mutation for `payload`, which must carry an entity id
    fn enqueue(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        operation: MutationOperation,
        payload: &Value,
    ) -> Result<Mutation>;

    /// Pending mutations of a tenant, oldest first
    fn get_pending(&self, tenant: &TenantId, limit: usize) -> Result<Vec<Mutation>>;

    /// Get a mutation by ID
    fn get(&self, id: &MutationId) -> Result<Option<Mutation>>;

    /// Flag a mutation as applied remotely. Safe to repeat.
    fn mark_synced(&self, id: &MutationId) -> Result<()>;

    /// Flag a mutation as superseded by newer remote state
    fn mark_discarded_stale(&self, id: &MutationId) -> Result<()>;

    /// Park a mutation whose data the remote store rejected
    fn mark_conflict(&self, id: &MutationId) -> Result<()>;

    /// Park a mutation that exhausted its retry budget
    fn mark_quarantined(&self, id: &MutationId) -> Result<()>;

    /// Set aside a mutation whose entity type this build cannot push
    fn mark_skipped(&self, id: &MutationId) -> Result<()>;

    /// Record a transient failure; returns the new retry count
    fn increment_retry(&self, id: &MutationId, error: &str) -> Result<u32>;

    /// Recent mutations of a tenant, newest first, optionally by status
    fn list(
        &self,
        tenant: &TenantId,
        status: Option<MutationStatus>,
        limit: usize,
    ) -> Result<Vec<Mutation>>;

    /// Number of mutations per status for a tenant
    fn count_by_status(&self, tenant: &TenantId) -> Result<Vec<(MutationStatus, usize)>>;
}

/// `SQLite` implementation of `MutationQueue`
pub struct SqliteMutationQueue<'a> {
    conn: &'a Connection,
}

const MUTATION_COLUMNS: &str = "id, tenant_id, entity_type, entity_id, operation, payload, \
     timestamp, synced, retry_count, status, last_error";

impl<'a> SqliteMutationQueue<'a> {
    /// Create a new queue with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Enqueue with an explicit timestamp
    pub fn enqueue_at(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        operation: MutationOperation,
        payload: &Value,
        timestamp: i64,
    ) -> Result<Mutation> {
        let Some(entity_id) = payload_entity_id(payload) else {
            tracing::warn!(
                entity_type = %kind,
                operation = %operation,
                "Refusing to enqueue mutation without an entity id"
            );
            return Err(Error::MissingEntityId {
                entity_type: kind.to_string(),
            });
        };

        let mutation = Mutation {
            id: MutationId::new(),
            tenant_id: tenant.to_string(),
            entity_type: kind.to_string(),
            entity_id: entity_id.to_string(),
            operation,
            payload: payload.clone(),
            timestamp,
            synced: false,
            retry_count: 0,
            status: MutationStatus::Pending,
            last_error: None,
        };

        self.conn.execute(
            "INSERT INTO mutations (id, tenant_id, entity_type, entity_id, operation, payload, timestamp, synced, retry_count, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?)",
            params![
                mutation.id.as_str(),
                mutation.tenant_id,
                mutation.entity_type,
                mutation.entity_id,
                mutation.operation.as_str(),
                serde_json::to_string(&mutation.payload)?,
                mutation.timestamp,
                mutation.status.as_str()
            ],
        )?;

        tracing::debug!(
            mutation_id = %mutation.id,
            entity_type = %mutation.entity_type,
            entity_id = %mutation.entity_id,
            "Enqueued mutation"
        );
        Ok(mutation)
    }

    /// Move a pending mutation to a terminal status.
    ///
    /// Repeating the same transition is a no-op; a mutation already in a
    /// different terminal status keeps it.
    fn transition(&self, id: &MutationId, to: MutationStatus, synced: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE mutations SET status = ?, synced = MAX(synced, ?)
             WHERE id = ? AND status IN ('pending', ?)",
            params![to.as_str(), i32::from(synced), id.as_str(), to.as_str()],
        )?;

        if rows == 0 {
            match self.get(id)? {
                None => return Err(Error::NotFound(id.to_string())),
                Some(existing) => tracing::debug!(
                    mutation_id = %id,
                    current = %existing.status,
                    requested = %to,
                    "Ignoring transition of settled mutation"
                ),
            }
        }
        Ok(())
    }

    /// Parse a mutation from a database row
    fn parse_mutation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mutation> {
        fn invalid<E>(column: usize, error: E) -> rusqlite::Error
        where
            E: std::error::Error + Send + Sync + 'static,
        {
            rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
        }

        let id: String = row.get(0)?;
        let operation: String = row.get(4)?;
        let payload: String = row.get(5)?;
        let status: String = row.get(9)?;
        let retry_count: i64 = row.get(8)?;

        Ok(Mutation {
            id: id.parse().map_err(|error| invalid(0, error))?,
            tenant_id: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            operation: operation.parse().map_err(|error| invalid(4, error))?,
            payload: serde_json::from_str(&payload).map_err(|error| invalid(5, error))?,
            timestamp: row.get(6)?,
            synced: row.get::<_, i32>(7)? != 0,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            status: status.parse().map_err(|error| invalid(9, error))?,
            last_error: row.get(10)?,
        })
    }
}

impl MutationQueue for SqliteMutationQueue<'_> {
    fn enqueue(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        operation: MutationOperation,
        payload: &Value,
    ) -> Result<Mutation> {
        self.enqueue_at(tenant, kind, operation, payload, now_millis())
    }

    fn get_pending(&self, tenant: &TenantId, limit: usize) -> Result<Vec<Mutation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MUTATION_COLUMNS}
             FROM mutations
             WHERE tenant_id = ? AND status = 'pending' AND synced = 0
             ORDER BY timestamp ASC, rowid ASC
             LIMIT ?"
        ))?;

        let mutations = stmt
            .query_map(
                params![tenant.as_str(), limit as i64],
                Self::parse_mutation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(mutations)
    }

    fn get(&self, id: &MutationId) -> Result<Option<Mutation>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {MUTATION_COLUMNS} FROM mutations WHERE id = ?"),
                params![id.as_str()],
                Self::parse_mutation,
            )
            .optional()?)
    }

    fn mark_synced(&self, id: &MutationId) -> Result<()> {
        self.transition(id, MutationStatus::Synced, true)
    }

    fn mark_discarded_stale(&self, id: &MutationId) -> Result<()> {
        self.transition(id, MutationStatus::DiscardedStale, true)
    }

    fn mark_conflict(&self, id: &MutationId) -> Result<()> {
        self.transition(id, MutationStatus::Conflict, false)
    }

    fn mark_quarantined(&self, id: &MutationId) -> Result<()> {
        self.transition(id, MutationStatus::Quarantined, false)
    }

    fn mark_skipped(&self, id: &MutationId) -> Result<()> {
        self.transition(id, MutationStatus::Skipped, false)
    }

    fn increment_retry(&self, id: &MutationId, error: &str) -> Result<u32> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "UPDATE mutations SET retry_count = retry_count + 1, last_error = ?
                 WHERE id = ?
                 RETURNING retry_count",
                params![error, id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        count
            .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn list(
        &self,
        tenant: &TenantId,
        status: Option<MutationStatus>,
        limit: usize,
    ) -> Result<Vec<Mutation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MUTATION_COLUMNS}
             FROM mutations
             WHERE tenant_id = ? AND (? IS NULL OR status = ?)
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?"
        ))?;

        let status = status.map(MutationStatus::as_str);
        let mutations = stmt
            .query_map(
                params![tenant.as_str(), status, status, limit as i64],
                Self::parse_mutation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(mutations)
    }

    fn count_by_status(&self, tenant: &TenantId) -> Result<Vec<(MutationStatus, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM mutations WHERE tenant_id = ? GROUP BY status",
        )?;
        let raw = stmt
            .query_map(params![tenant.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = MutationStatus::ALL
            .into_iter()
            .map(|status| (status, 0usize))
            .collect::<Vec<_>>();
        for (status, count) in raw {
            let status: MutationStatus = status.parse()?;
            if let Some(entry) = counts.iter_mut().find(|(known, _)| *known == status) {
                entry.1 = usize::try_from(count).unwrap_or_default();
            }
        }
        Ok(counts)
    }
}
