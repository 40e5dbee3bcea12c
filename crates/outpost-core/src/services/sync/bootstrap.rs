//! Bootstrap path: hydrate the local store from a full remote snapshot.

use futures::future::try_join_all;
use serde::Serialize;

use super::inbound::{apply_row, ApplyOutcome};
use super::SyncService;
use crate::error::{Error, Result};
use crate::mapping::RemoteRow;
use crate::models::{EntityKind, TenantContext};
use crate::remote::RemoteStore;

/// Result of pulling one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub kind: EntityKind,
    /// Rows returned by the remote store
    pub fetched: usize,
    pub applied: usize,
    /// Rows left alone because the local copy was newer
    pub kept_local: usize,
    /// Rows of other tenants or rows that failed to map
    pub skipped: usize,
    /// Fetch error of a non-critical table that was skipped entirely
    pub error: Option<String>,
}

impl TableReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            fetched: 0,
            applied: 0,
            kept_local: 0,
            skipped: 0,
            error: None,
        }
    }
}

/// Result of a full bootstrap, one entry per registered table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub tables: Vec<TableReport>,
}

impl BootstrapReport {
    pub fn table(&self, kind: EntityKind) -> Option<&TableReport> {
        self.tables.iter().find(|table| table.kind == kind)
    }

    /// Rows applied for `kind`
    pub fn applied(&self, kind: EntityKind) -> usize {
        self.table(kind).map_or(0, |table| table.applied)
    }

    pub fn total_applied(&self) -> usize {
        self.tables.iter().map(|table| table.applied).sum()
    }

    /// Non-critical tables whose fetch failed
    pub fn failed_tables(&self) -> Vec<EntityKind> {
        self.tables
            .iter()
            .filter(|table| table.error.is_some())
            .map(|table| table.kind)
            .collect()
    }
}

/// Rows fetched for one table, or the error of a skipped non-critical table
type Fetched = (EntityKind, std::result::Result<Vec<RemoteRow>, String>);

impl<R: RemoteStore> SyncService<R> {
    /// Pull every registered table for the session tenant.
    ///
    /// Tables are fetched concurrently. A failing non-critical table is logged
    /// and reported; a failing core table aborts before anything is written.
    /// The whole pull is bounded by `bootstrap_deadline`.
    pub async fn pull_all_data(&self, ctx: &TenantContext) -> Result<BootstrapReport> {
        let deadline = self.config.bootstrap_deadline;
        tracing::info!(tenant = %ctx.tenant_id(), "Starting bootstrap");

        let report = tokio::time::timeout(deadline, self.pull_tables(ctx))
            .await
            .map_err(|_| {
                tracing::error!(
                    tenant = %ctx.tenant_id(),
                    "Bootstrap timed out after {deadline:?}"
                );
                Error::BootstrapTimedOut(deadline)
            })??;

        tracing::info!(
            tenant = %ctx.tenant_id(),
            applied = report.total_applied(),
            failed_tables = ?report.failed_tables(),
            "Bootstrap finished"
        );
        Ok(report)
    }

    async fn pull_tables(&self, ctx: &TenantContext) -> Result<BootstrapReport> {
        let fetches = EntityKind::ALL.map(|kind| self.fetch_table(ctx, kind));
        let fetched = try_join_all(fetches).await?;

        self.with_db(|db| {
            let mut report = BootstrapReport::default();
            for (kind, rows) in fetched {
                let mut table = TableReport::new(kind);
                match rows {
                    Ok(rows) => {
                        table.fetched = rows.len();
                        for row in &rows {
                            match apply_row(db.connection_mut(), ctx, kind, row) {
                                Ok(ApplyOutcome::Applied) => table.applied += 1,
                                Ok(ApplyOutcome::KeptNewerLocal) => table.kept_local += 1,
                                Ok(outcome) => {
                                    tracing::debug!(
                                        entity_type = %kind,
                                        ?outcome,
                                        "Skipped bootstrap row"
                                    );
                                    table.skipped += 1;
                                }
                                Err(Error::Mapping(error)) => {
                                    tracing::warn!(
                                        entity_type = %kind,
                                        "Skipped unmappable row: {error}"
                                    );
                                    table.skipped += 1;
                                }
                                Err(Error::TenantMismatch { found, .. }) => {
                                    tracing::warn!(
                                        entity_type = %kind,
                                        "Skipped row owned by {found}"
                                    );
                                    table.skipped += 1;
                                }
                                Err(error) => return Err(error),
                            }
                        }
                    }
                    Err(error) => table.error = Some(error),
                }
                report.tables.push(table);
            }
            Ok(report)
        })
        .await
    }

    async fn fetch_table(&self, ctx: &TenantContext, kind: EntityKind) -> Result<Fetched> {
        let table = kind.remote_table();
        match self
            .remote
            .select_by_tenant(table, ctx.tenant_id().as_str())
            .await
        {
            Ok(rows) => {
                tracing::debug!(table, rows = rows.len(), "Fetched table");
                Ok((kind, Ok(rows)))
            }
            Err(error) if kind.is_core() => {
                tracing::error!(table, "Bootstrap of core table failed: {error}");
                Err(Error::BootstrapAborted {
                    table: table.to_string(),
                    reason: error.to_string(),
                })
            }
            Err(error) => {
                tracing::warn!(table, "Skipping non-critical table: {error}");
                Ok((kind, Err(error.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, manual, service};
    use super::*;
    use crate::db::{EntityStore, SqliteEntityStore};
    use crate::mapping::FieldMapper;
    use crate::models::{Customer, MutationOperation, Synchronizable, TenantId, Vehicle};
    use crate::remote::{InMemoryRemoteStore, RemoteError};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn owned<E: FieldMapper>(mut entity: E, tenant: &str) -> RemoteRow {
        entity.set_tenant_id(TenantId::new(tenant).unwrap());
        entity.to_remote()
    }

    fn seed_garage(remote: &InMemoryRemoteStore) {
        for plate in ["AA-1", "AA-2", "AA-3"] {
            remote.seed("vehicles", owned(Vehicle::new(plate, "Opel", "Corsa"), "G"));
        }
        for name in ["Ana", "Luis"] {
            remote.seed("customers", owned(Customer::new(name), "G"));
        }
        remote.seed("vehicles", owned(Vehicle::new("ZZ-9", "Kia", "Rio"), "other"));
    }

    async fn local_count(
        sync: &SyncService<InMemoryRemoteStore>,
        kind: EntityKind,
    ) -> usize {
        sync.with_db(|db| {
            SqliteEntityStore::new(db.connection()).count(ctx("G").tenant_id(), kind)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn hydrates_local_store_for_the_tenant() {
        let (sync, remote) = service(manual());
        seed_garage(&remote);

        let report = sync.pull_all_data(&ctx("G")).await.unwrap();

        assert_eq!(report.applied(EntityKind::Vehicle), 3);
        assert_eq!(report.applied(EntityKind::Customer), 2);
        assert_eq!(report.applied(EntityKind::Employee), 0);
        assert_eq!(local_count(&sync, EntityKind::Vehicle).await, 3);
        assert_eq!(local_count(&sync, EntityKind::Customer).await, 2);
    }

    #[tokio::test]
    async fn non_critical_failure_does_not_abort() {
        let (sync, remote) = service(manual());
        seed_garage(&remote);
        remote.fail_table("employees", RemoteError::Unavailable("relation locked".into()));

        let report = sync.pull_all_data(&ctx("G")).await.unwrap();

        assert_eq!(report.failed_tables(), vec![EntityKind::Employee]);
        assert_eq!(local_count(&sync, EntityKind::Vehicle).await, 3);
        assert_eq!(local_count(&sync, EntityKind::Customer).await, 2);
    }

    #[tokio::test]
    async fn core_failure_aborts_without_writing() {
        let (sync, remote) = service(manual());
        seed_garage(&remote);
        remote.fail_table("service_orders", RemoteError::Timeout("5s".into()));

        let error = sync.pull_all_data(&ctx("G")).await.unwrap_err();

        assert!(matches!(
            error,
            Error::BootstrapAborted { ref table, .. } if table == "service_orders"
        ));
        assert_eq!(local_count(&sync, EntityKind::Vehicle).await, 0);
    }

    #[tokio::test]
    async fn unmappable_rows_are_skipped() {
        let (sync, remote) = service(manual());
        seed_garage(&remote);
        let mut broken = owned(Customer::new("Broken"), "G");
        broken.remove("name");
        remote.seed("customers", broken);

        let report = sync.pull_all_data(&ctx("G")).await.unwrap();

        let customers = report.table(EntityKind::Customer).unwrap();
        assert_eq!(customers.fetched, 3);
        assert_eq!(customers.applied, 2);
        assert_eq!(customers.skipped, 1);
    }

    #[tokio::test]
    async fn bootstrap_keeps_pending_local_edits() {
        let (sync, remote) = service(manual());
        let mut vehicle = Vehicle::new("AA-1", "Opel", "Corsa");
        vehicle.updated_at = 1_000;
        remote.seed("vehicles", owned(vehicle.clone(), "G"));

        vehicle.plate = "AA-1 (edited)".into();
        vehicle.updated_at = 2_000;
        sync.save(&ctx("G"), MutationOperation::Update, vehicle.clone())
            .await
            .unwrap();

        let report = sync.pull_all_data(&ctx("G")).await.unwrap();

        assert_eq!(report.table(EntityKind::Vehicle).unwrap().kept_local, 1);
        let local: Vehicle = sync
            .with_db(|db| {
                SqliteEntityStore::new(db.connection()).get_entity(ctx("G").tenant_id(), &vehicle.id)
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local.plate, "AA-1 (edited)");
    }

    /// Remote whose reads never complete
    struct Stalled;

    #[async_trait::async_trait]
    impl RemoteStore for Stalled {
        async fn upsert(
            &self,
            _table: &str,
            _row: RemoteRow,
        ) -> std::result::Result<(), RemoteError> {
            Ok(())
        }

        async fn fetch_updated_at(
            &self,
            _table: &str,
            _tenant_id: &str,
            _id: &str,
        ) -> std::result::Result<Option<i64>, RemoteError> {
            Ok(None)
        }

        async fn select_by_tenant(
            &self,
            _table: &str,
            _tenant_id: &str,
        ) -> std::result::Result<Vec<RemoteRow>, RemoteError> {
            std::future::pending().await
        }

        fn subscribe(&self) -> std::result::Result<crate::remote::ChangeFeed, RemoteError> {
            Err(RemoteError::Unavailable("no feed".into()))
        }
    }

    #[tokio::test]
    async fn deadline_bounds_the_pull() {
        let config = manual().with_bootstrap_deadline(Duration::from_millis(50));
        let db = crate::db::Database::open_in_memory().unwrap();
        let sync = SyncService::new(db, std::sync::Arc::new(Stalled), config);

        let error = sync.pull_all_data(&ctx("G")).await.unwrap_err();
        assert!(matches!(
            error,
            Error::BootstrapTimedOut(deadline) if deadline == Duration::from_millis(50)
        ));
    }
}
