//! In-process remote store with fault injection, for tests and demos

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{
    validate_row, ChangeFeed, ChangeKind, RemoteChange, RemoteError, RemoteStore,
    CHANGE_FEED_CAPACITY,
};
use crate::mapping::{row_tenant_id, RemoteRow};

type Tables = BTreeMap<String, BTreeMap<String, RemoteRow>>;

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    transient_upserts_remaining: usize,
    failing_tables: BTreeMap<String, RemoteError>,
    rejected_ids: BTreeMap<String, String>,
}

struct Inner {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    changes: broadcast::Sender<RemoteChange>,
    upserts: AtomicUsize,
}

/// Remote store kept in memory.
///
/// Cloning shares the same tables, so a test can hold one handle while the
/// sync service owns another.
#[derive(Clone)]
pub struct InMemoryRemoteStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(CHANGE_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::new()),
                faults: Mutex::new(Faults::default()),
                changes,
                upserts: AtomicUsize::new(0),
            }),
        }
    }

    /// Insert a row directly, without validation or change events
    pub fn seed(&self, table: &str, row: RemoteRow) {
        let id = row
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        lock(&self.inner.tables)
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    pub fn row(&self, table: &str, id: &str) -> Option<RemoteRow> {
        lock(&self.inner.tables)
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    pub fn rows(&self, table: &str) -> Vec<RemoteRow> {
        lock(&self.inner.tables)
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of upserts that reached storage
    pub fn upsert_count(&self) -> usize {
        self.inner.upserts.load(Ordering::SeqCst)
    }

    /// Fail every call with a transient error while offline
    pub fn set_offline(&self, offline: bool) {
        lock(&self.inner.faults).offline = offline;
    }

    /// Fail the next `count` upserts with a transient error
    pub fn fail_next_upserts(&self, count: usize) {
        lock(&self.inner.faults).transient_upserts_remaining = count;
    }

    /// Fail reads of `table` with `error`
    pub fn fail_table(&self, table: &str, error: RemoteError) {
        lock(&self.inner.faults)
            .failing_tables
            .insert(table.to_string(), error);
    }

    /// Reject upserts of the row with primary id `id`
    pub fn reject_id(&self, id: &str, message: &str) {
        lock(&self.inner.faults)
            .rejected_ids
            .insert(id.to_string(), message.to_string());
    }

    /// Apply a change as if another client wrote it, and broadcast it
    pub fn publish(&self, change: RemoteChange) {
        {
            let mut tables = lock(&self.inner.tables);
            let rows = tables.entry(change.table.clone()).or_default();
            let id = change
                .row
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            match change.kind {
                ChangeKind::Delete => {
                    rows.remove(&id);
                }
                ChangeKind::Insert | ChangeKind::Update => {
                    rows.insert(id, change.row.clone());
                }
            }
        }
        // No subscribers is not an error for a publisher.
        let _ = self.inner.changes.send(change);
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if lock(&self.inner.faults).offline {
            Err(RemoteError::Unavailable("network unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn upsert(&self, table: &str, row: RemoteRow) -> Result<(), RemoteError> {
        self.check_online()?;
        let keys = validate_row(table, &row)?;

        {
            let mut faults = lock(&self.inner.faults);
            if faults.transient_upserts_remaining > 0 {
                faults.transient_upserts_remaining -= 1;
                return Err(RemoteError::Unavailable("connection reset".into()));
            }
            if let Some(message) = faults.rejected_ids.get(&keys.id) {
                return Err(RemoteError::rejected("23514", message.clone()));
            }
        }

        let kind = {
            let mut tables = lock(&self.inner.tables);
            let rows = tables.entry(table.to_string()).or_default();
            let kind = match rows.get(&keys.id) {
                Some(existing) if row_tenant_id(existing) != Some(keys.tenant_id.as_str()) => {
                    return Err(RemoteError::rejected(
                        "42501",
                        format!("row {} belongs to another tenant", keys.id),
                    ));
                }
                Some(_) => ChangeKind::Update,
                None => ChangeKind::Insert,
            };
            rows.insert(keys.id.clone(), row.clone());
            kind
        };

        self.inner.upserts.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.changes.send(RemoteChange {
            table: table.to_string(),
            kind,
            row,
        });
        Ok(())
    }

    async fn fetch_updated_at(
        &self,
        table: &str,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<i64>, RemoteError> {
        self.check_online()?;
        Ok(self
            .row(table, id)
            .filter(|row| row_tenant_id(row) == Some(tenant_id))
            .and_then(|row| crate::mapping::row_updated_at(&row)))
    }

    async fn select_by_tenant(
        &self,
        table: &str,
        tenant_id: &str,
    ) -> Result<Vec<RemoteRow>, RemoteError> {
        self.check_online()?;
        if let Some(error) = lock(&self.inner.faults).failing_tables.get(table) {
            return Err(error.clone());
        }
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| row_tenant_id(row) == Some(tenant_id))
            .collect())
    }

    fn subscribe(&self) -> Result<ChangeFeed, RemoteError> {
        self.check_online()?;
        Ok(self.inner.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, tenant: &str, updated_at: &str) -> RemoteRow {
        json!({ "id": id, "tenant_id": tenant, "updated_at": updated_at })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_broadcasts() {
        let store = InMemoryRemoteStore::new();
        let mut feed = store.subscribe().unwrap();

        store
            .upsert("vehicles", row("v1", "g1", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        store
            .upsert("vehicles", row("v1", "g1", "2024-01-02T00:00:00.000Z"))
            .await
            .unwrap();

        assert_eq!(store.rows("vehicles").len(), 1);
        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Insert);
        assert_eq!(feed.recv().await.unwrap().kind, ChangeKind::Update);
        assert_eq!(store.upsert_count(), 2);
    }

    #[tokio::test]
    async fn upsert_refuses_to_move_rows_between_tenants() {
        let store = InMemoryRemoteStore::new();
        store
            .upsert("vehicles", row("v1", "g1", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        let error = store
            .upsert("vehicles", row("v1", "g2", "2024-01-02T00:00:00.000Z"))
            .await
            .unwrap_err();
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn fetch_updated_at_is_tenant_scoped() {
        let store = InMemoryRemoteStore::new();
        store.seed("vehicles", row("v1", "g1", "1970-01-01T00:00:01.000Z"));

        assert_eq!(
            store.fetch_updated_at("vehicles", "g1", "v1").await.unwrap(),
            Some(1000)
        );
        assert_eq!(store.fetch_updated_at("vehicles", "g2", "v1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn offline_store_reports_transient_errors() {
        let store = InMemoryRemoteStore::new();
        store.set_offline(true);
        let error = store.select_by_tenant("vehicles", "g1").await.unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn injected_upsert_failures_are_consumed() {
        let store = InMemoryRemoteStore::new();
        store.fail_next_upserts(1);
        let first = store
            .upsert("vehicles", row("v1", "g1", "2024-01-01T00:00:00.000Z"))
            .await;
        assert!(first.unwrap_err().is_transient());
        store
            .upsert("vehicles", row("v1", "g1", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();
    }
}
