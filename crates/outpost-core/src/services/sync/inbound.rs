//! Inbound apply: the one path that writes remote rows into the local store.

use rusqlite::Connection;
use serde::Serialize;

use super::SyncService;
use crate::db::{EntityStore, SqliteEntityStore};
use crate::error::Result;
use crate::mapping::{
    carry_local_only_fields, row_id, row_tenant_id, row_updated_at, to_local_document,
    MappingError, RemoteRow, ID_COLUMN,
};
use crate::models::{EntityKind, TenantContext};
use crate::remote::{ChangeKind, RemoteChange, RemoteError, RemoteStore};

/// What an inbound row did to the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The local document now mirrors the remote row
    Applied,
    /// The local document was strictly newer and was left alone
    KeptNewerLocal,
    /// A remote delete removed the local document
    Removed,
    /// A remote delete named a document this device never had
    NotPresent,
    /// The row belongs to another tenant or names none
    ForeignTenant,
}

/// Inbound rows are only ours when they name the session tenant
fn is_foreign(ctx: &TenantContext, row: &RemoteRow) -> bool {
    !row_tenant_id(row).is_some_and(|tenant| ctx.owns(tenant))
}

/// Upsert a remote row unless the local copy is newer.
///
/// Runs in its own transaction so the read-compare-write for one entity
/// cannot interleave with another write to it.
pub(super) fn apply_row(
    conn: &mut Connection,
    ctx: &TenantContext,
    kind: EntityKind,
    row: &RemoteRow,
) -> Result<ApplyOutcome> {
    if is_foreign(ctx, row) {
        return Ok(ApplyOutcome::ForeignTenant);
    }
    let mut incoming = to_local_document(kind, row, ctx)?;

    let tx = conn.transaction()?;
    let outcome = {
        let store = SqliteEntityStore::new(&tx);
        match store.get(ctx.tenant_id(), kind, &incoming.entity_id)? {
            Some(existing) if existing.updated_at > incoming.updated_at => {
                ApplyOutcome::KeptNewerLocal
            }
            existing => {
                if let Some(existing) = existing {
                    carry_local_only_fields(kind, &existing.document, &mut incoming.document);
                }
                store.upsert(&incoming)?;
                ApplyOutcome::Applied
            }
        }
    };
    tx.commit()?;

    tracing::trace!(
        entity_type = %kind,
        entity_id = %incoming.entity_id,
        ?outcome,
        "Applied inbound row"
    );
    Ok(outcome)
}

/// Remove the local document a remote hard delete refers to
pub(super) fn apply_delete(
    conn: &mut Connection,
    ctx: &TenantContext,
    kind: EntityKind,
    row: &RemoteRow,
) -> Result<ApplyOutcome> {
    if is_foreign(ctx, row) {
        return Ok(ApplyOutcome::ForeignTenant);
    }
    let id = row_id(row).ok_or_else(|| MappingError::MissingField {
        table: kind.remote_table(),
        field: ID_COLUMN.to_string(),
    })?;

    let tx = conn.transaction()?;
    let outcome = {
        let store = SqliteEntityStore::new(&tx);
        match store.get(ctx.tenant_id(), kind, id)? {
            None => ApplyOutcome::NotPresent,
            Some(existing)
                if row_updated_at(row).is_some_and(|remote| existing.updated_at > remote) =>
            {
                ApplyOutcome::KeptNewerLocal
            }
            Some(_) => {
                store.remove(ctx.tenant_id(), kind, id)?;
                ApplyOutcome::Removed
            }
        }
    };
    tx.commit()?;
    Ok(outcome)
}

impl<R: RemoteStore> SyncService<R> {
    /// Apply one change-feed event to the local store
    pub async fn apply_change(
        &self,
        ctx: &TenantContext,
        change: &RemoteChange,
    ) -> Result<ApplyOutcome> {
        let kind = EntityKind::from_remote_table(&change.table)
            .ok_or_else(|| RemoteError::UnknownTable(change.table.clone()))?;

        self.with_db(|db| match change.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                apply_row(db.connection_mut(), ctx, kind, &change.row)
            }
            ChangeKind::Delete => apply_delete(db.connection_mut(), ctx, kind, &change.row),
        })
        .await
    }
}
