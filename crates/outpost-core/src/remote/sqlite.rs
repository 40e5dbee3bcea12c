//! Remote store backed by a shared `SQLite` file.
//!
//! Stands in for the cloud store during local development: several local
//! databases can push to and bootstrap from the same file. Change events
//! are only published for writes made through this handle; writes from other
//! processes are picked up by the next bootstrap.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::broadcast;
use tokio::task::spawn_blocking;

use super::{
    validate_row, ChangeFeed, ChangeKind, RemoteChange, RemoteError, RemoteStore,
    CHANGE_FEED_CAPACITY,
};
use crate::mapping::RemoteRow;
use crate::models::EntityKind;

pub struct SqliteRemoteStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<RemoteChange>,
}

impl SqliteRemoteStore {
    /// Open (or create) the shared store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let conn = Connection::open(path).map_err(map_sqlite_error)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self, RemoteError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, RemoteError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(map_sqlite_error)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS remote_rows (
                table_name TEXT NOT NULL,
                id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                row_json TEXT NOT NULL,
                PRIMARY KEY (table_name, id)
            );
            CREATE INDEX IF NOT EXISTS idx_remote_rows_tenant
                ON remote_rows(table_name, tenant_id);",
        )
        .map_err(map_sqlite_error)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }

    /// Run `work` against the connection on the blocking pool.
    ///
    /// A busy shared file can hold a statement for the whole busy timeout,
    /// which must not stall a runtime worker.
    async fn blocking<T, F>(&self, work: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RemoteError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&conn)
        })
        .await
        .map_err(|error| RemoteError::Unavailable(format!("remote store task failed: {error}")))?
    }
}

/// Busy/locked databases and I/O trouble are worth retrying; constraint
/// failures are not.
fn map_sqlite_error(error: rusqlite::Error) -> RemoteError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                RemoteError::Timeout(error.to_string())
            }
            ErrorCode::ConstraintViolation => RemoteError::rejected("23000", error.to_string()),
            _ => RemoteError::Unavailable(error.to_string()),
        },
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            RemoteError::rejected("22000", error.to_string())
        }
        _ => RemoteError::Unavailable(error.to_string()),
    }
}

fn parse_row(raw: &str) -> Result<RemoteRow, RemoteError> {
    serde_json::from_str(raw)
        .map_err(|error| RemoteError::Unavailable(format!("corrupt stored row: {error}")))
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn upsert(&self, table: &str, row: RemoteRow) -> Result<(), RemoteError> {
        let keys = validate_row(table, &row)?;
        let row_json = serde_json::to_string(&row)
            .map_err(|error| RemoteError::rejected("22000", error.to_string()))?;

        let table_name = table.to_string();
        let kind = self
            .blocking(move |conn| {
                let existing_tenant: Option<String> = conn
                    .query_row(
                        "SELECT tenant_id FROM remote_rows WHERE table_name = ? AND id = ?",
                        params![table_name, keys.id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(map_sqlite_error)?;

                let kind = match existing_tenant {
                    Some(tenant) if tenant != keys.tenant_id => {
                        return Err(RemoteError::rejected(
                            "42501",
                            format!("row {} belongs to another tenant", keys.id),
                        ));
                    }
                    Some(_) => ChangeKind::Update,
                    None => ChangeKind::Insert,
                };

                conn.execute(
                    "INSERT INTO remote_rows (table_name, id, tenant_id, updated_at, row_json)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(table_name, id) DO UPDATE SET
                        updated_at = excluded.updated_at,
                        row_json = excluded.row_json",
                    params![table_name, keys.id, keys.tenant_id, keys.updated_at, row_json],
                )
                .map_err(map_sqlite_error)?;
                Ok(kind)
            })
            .await?;

        let _ = self.changes.send(RemoteChange {
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
        let (table, tenant_id, id) = (table.to_string(), tenant_id.to_string(), id.to_string());
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT updated_at FROM remote_rows
                 WHERE table_name = ? AND tenant_id = ? AND id = ?",
                params![table, tenant_id, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_error)
        })
        .await
    }

    async fn select_by_tenant(
        &self,
        table: &str,
        tenant_id: &str,
    ) -> Result<Vec<RemoteRow>, RemoteError> {
        if EntityKind::from_remote_table(table).is_none() {
            return Err(RemoteError::UnknownTable(table.to_string()));
        }

        let (table, tenant_id) = (table.to_string(), tenant_id.to_string());
        let raw_rows = self
            .blocking(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT row_json FROM remote_rows
                         WHERE table_name = ? AND tenant_id = ?
                         ORDER BY updated_at ASC",
                    )
                    .map_err(map_sqlite_error)?;
                let rows = stmt
                    .query_map(params![table, tenant_id], |row| row.get::<_, String>(0))
                    .map_err(map_sqlite_error)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(map_sqlite_error)?;
                Ok(rows)
            })
            .await?;

        raw_rows.iter().map(|raw| parse_row(raw)).collect()
    }

    fn subscribe(&self) -> Result<ChangeFeed, RemoteError> {
        Ok(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn row(id: &str, tenant: &str, updated_at: &str) -> RemoteRow {
        json!({ "id": id, "tenant_id": tenant, "updated_at": updated_at, "make": "Seat" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_then_select_by_tenant() {
        let store = SqliteRemoteStore::open_in_memory().unwrap();
        store
            .upsert("vehicles", row("v1", "g1", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();
        store
            .upsert("vehicles", row("v2", "g2", "2024-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let rows = store.select_by_tenant("vehicles", "g1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("v1"));
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = SqliteRemoteStore::open_in_memory().unwrap();
        let original = row("v1", "g1", "2024-01-01T00:00:00.000Z");
        store.upsert("vehicles", original.clone()).await.unwrap();
        store.upsert("vehicles", original.clone()).await.unwrap();

        let rows = store.select_by_tenant("vehicles", "g1").await.unwrap();
        assert_eq!(rows, vec![original]);
    }

    #[tokio::test]
    async fn rows_persist_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.db");
        {
            let store = SqliteRemoteStore::open(&path).unwrap();
            store
                .upsert("customers", row("c1", "g1", "1970-01-01T00:00:02.000Z"))
                .await
                .unwrap();
        }

        let reopened = SqliteRemoteStore::open(&path).unwrap();
        assert_eq!(
            reopened.fetch_updated_at("customers", "g1", "c1").await.unwrap(),
            Some(2000)
        );
    }

    #[tokio::test]
    async fn unknown_tables_are_rejected() {
        let store = SqliteRemoteStore::open_in_memory().unwrap();
        let error = store.select_by_tenant("invoices", "g1").await.unwrap_err();
        assert_eq!(error, RemoteError::UnknownTable("invoices".into()));
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_connection() {
        let store = Arc::new(SqliteRemoteStore::open_in_memory().unwrap());
        let writes = (0..8).map(|index| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .upsert("vehicles", row(&format!("v{index}"), "g1", "2024-01-01T00:00:00.000Z"))
                    .await
            })
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap().unwrap();
        }

        assert_eq!(store.select_by_tenant("vehicles", "g1").await.unwrap().len(), 8);
    }
}
