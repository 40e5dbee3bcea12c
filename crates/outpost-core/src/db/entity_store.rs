//! Tenant-scoped local document store

use crate::error::{Error, Result};
use crate::mapping::LocalDocument;
use crate::models::{EntityKind, Synchronizable, TenantId};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for local entity storage operations
pub trait EntityStore {
    /// Insert or replace a document. Never moves a row to another tenant.
    fn upsert(&self, document: &LocalDocument) -> Result<()>;

    /// Get a document by id within a tenant
    fn get(&self, tenant: &TenantId, kind: EntityKind, id: &str) -> Result<Option<LocalDocument>>;

    /// List a tenant's documents of one kind, oldest update first
    fn list(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        include_deleted: bool,
    ) -> Result<Vec<LocalDocument>>;

    /// Count a tenant's live documents of one kind
    fn count(&self, tenant: &TenantId, kind: EntityKind) -> Result<usize>;

    /// Remove a document outright; returns whether a row existed
    fn remove(&self, tenant: &TenantId, kind: EntityKind, id: &str) -> Result<bool>;
}

/// `SQLite` implementation of `EntityStore`
pub struct SqliteEntityStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntityStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Read a document back as its model type
    pub fn get_entity<E: Synchronizable>(&self, tenant: &TenantId, id: &str) -> Result<Option<E>> {
        self.get(tenant, E::KIND, id)?
            .map(|document| serde_json::from_value(document.document).map_err(Error::from))
            .transpose()
    }

    /// List live documents as their model type
    pub fn list_entities<E: Synchronizable>(&self, tenant: &TenantId) -> Result<Vec<E>> {
        self.list(tenant, E::KIND, false)?
            .into_iter()
            .map(|document| serde_json::from_value(document.document).map_err(Error::from))
            .collect()
    }

    fn owner_of(&self, kind: EntityKind, id: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT tenant_id FROM entities WHERE entity_type = ? AND entity_id = ?",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Row parser for documents of `kind`
    fn parse_document(
        kind: EntityKind,
    ) -> impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<LocalDocument> {
        move |row: &rusqlite::Row<'_>| {
            let raw: String = row.get(2)?;
            let document = serde_json::from_str(&raw).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?;
            Ok(LocalDocument {
                kind,
                entity_id: row.get(0)?,
                tenant_id: row.get(1)?,
                document,
                updated_at: row.get(3)?,
                is_deleted: row.get::<_, i32>(4)? != 0,
            })
        }
    }
}

impl EntityStore for SqliteEntityStore<'_> {
    fn upsert(&self, document: &LocalDocument) -> Result<()> {
        if let Some(owner) = self.owner_of(document.kind, &document.entity_id)? {
            if owner != document.tenant_id {
                return Err(Error::TenantMismatch {
                    expected: owner,
                    found: document.tenant_id.clone(),
                });
            }
        }

        self.conn.execute(
            "INSERT INTO entities (entity_type, entity_id, tenant_id, document, updated_at, is_deleted)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at,
                is_deleted = excluded.is_deleted",
            params![
                document.kind.as_str(),
                document.entity_id,
                document.tenant_id,
                serde_json::to_string(&document.document)?,
                document.updated_at,
                i32::from(document.is_deleted)
            ],
        )?;

        Ok(())
    }

    fn get(&self, tenant: &TenantId, kind: EntityKind, id: &str) -> Result<Option<LocalDocument>> {
        let result = self
            .conn
            .query_row(
                "SELECT entity_id, tenant_id, document, updated_at, is_deleted
                 FROM entities
                 WHERE tenant_id = ? AND entity_type = ? AND entity_id = ?",
                params![tenant.as_str(), kind.as_str(), id],
                Self::parse_document(kind),
            )
            .optional()?;

        Ok(result)
    }

    fn list(
        &self,
        tenant: &TenantId,
        kind: EntityKind,
        include_deleted: bool,
    ) -> Result<Vec<LocalDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, tenant_id, document, updated_at, is_deleted
             FROM entities
             WHERE tenant_id = ? AND entity_type = ? AND (? OR is_deleted = 0)
             ORDER BY updated_at ASC, entity_id ASC",
        )?;

        let documents = stmt
            .query_map(
                params![tenant.as_str(), kind.as_str(), include_deleted],
                Self::parse_document(kind),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(documents)
    }

    fn count(&self, tenant: &TenantId, kind: EntityKind) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities
             WHERE tenant_id = ? AND entity_type = ? AND is_deleted = 0",
            params![tenant.as_str(), kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn remove(&self, tenant: &TenantId, kind: EntityKind, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM entities WHERE tenant_id = ? AND entity_type = ? AND entity_id = ?",
            params![tenant.as_str(), kind.as_str(), id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Customer, TenantContext, Vehicle};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn ctx(tenant: &str) -> TenantContext {
        TenantContext::new(TenantId::new(tenant).unwrap())
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup();
        let store = SqliteEntityStore::new(db.connection());
        let ctx = ctx("g1");

        let vehicle = Vehicle::new("AB-123", "Renault", "Clio");
        let document = LocalDocument::from_entity(&vehicle, &ctx).unwrap();
        store.upsert(&document).unwrap();

        let fetched = store
            .get(ctx.tenant_id(), EntityKind::Vehicle, &vehicle.id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched, document);

        let typed: Vehicle = store
            .get_entity(ctx.tenant_id(), &vehicle.id)
            .unwrap()
            .unwrap();
        assert_eq!(typed, vehicle);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let db = setup();
        let store = SqliteEntityStore::new(db.connection());
        let ctx = ctx("g1");

        let mut customer = Customer::new("Ana");
        store
            .upsert(&LocalDocument::from_entity(&customer, &ctx).unwrap())
            .unwrap();
        customer.full_name = "Ana Ruiz".into();
        customer.updated_at += 10;
        store
            .upsert(&LocalDocument::from_entity(&customer, &ctx).unwrap())
            .unwrap();

        let all: Vec<Customer> = store.list_entities(ctx.tenant_id()).unwrap();
        assert_eq!(all, vec![customer]);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let db = setup();
        let store = SqliteEntityStore::new(db.connection());
        let vehicle = Vehicle::new("AB-123", "Renault", "Clio");
        store
            .upsert(&LocalDocument::from_entity(&vehicle, &ctx("g1")).unwrap())
            .unwrap();

        let other = ctx("g2");
        assert!(store
            .get(other.tenant_id(), EntityKind::Vehicle, &vehicle.id)
            .unwrap()
            .is_none());
        assert_eq!(store.count(other.tenant_id(), EntityKind::Vehicle).unwrap(), 0);

        let hijack = LocalDocument::from_entity(&vehicle, &other).unwrap();
        assert!(matches!(
            store.upsert(&hijack),
            Err(Error::TenantMismatch { .. })
        ));
    }

    #[test]
    fn test_list_skips_tombstones_unless_asked() {
        let db = setup();
        let store = SqliteEntityStore::new(db.connection());
        let ctx = ctx("g1");

        let mut gone = Customer::new("Gone");
        gone.is_deleted = true;
        store
            .upsert(&LocalDocument::from_entity(&gone, &ctx).unwrap())
            .unwrap();
        store
            .upsert(&LocalDocument::from_entity(&Customer::new("Here"), &ctx).unwrap())
            .unwrap();

        assert_eq!(store.list(ctx.tenant_id(), EntityKind::Customer, false).unwrap().len(), 1);
        assert_eq!(store.list(ctx.tenant_id(), EntityKind::Customer, true).unwrap().len(), 2);
        assert_eq!(store.count(ctx.tenant_id(), EntityKind::Customer).unwrap(), 1);
    }

    #[test]
    fn test_remove() {
        let db = setup();
        let store = SqliteEntityStore::new(db.connection());
        let ctx = ctx("g1");
        let vehicle = Vehicle::new("AB-123", "Renault", "Clio");
        store
            .upsert(&LocalDocument::from_entity(&vehicle, &ctx).unwrap())
            .unwrap();

        assert!(store.remove(ctx.tenant_id(), EntityKind::Vehicle, &vehicle.id).unwrap());
        assert!(!store.remove(ctx.tenant_id(), EntityKind::Vehicle, &vehicle.id).unwrap());
    }
}
