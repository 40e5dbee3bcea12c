//! Vehicle model

use serde::{Deserialize, Serialize};

use super::{new_entity_id, now_millis, EntityKind, Synchronizable, TenantId};

/// A customer vehicle known to the shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    /// Primary id, shared with the remote row
    pub id: String,
    /// Owning tenant; injected from the session when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    /// License plate as printed
    pub plate: String,
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// Owning customer, if known
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Path of a photo on this device. Never leaves the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), the LWW clock
    pub updated_at: i64,
    /// Soft delete flag for sync
    #[serde(default)]
    pub is_deleted: bool,
}

impl Vehicle {
    /// Create a new vehicle with a fresh id
    #[must_use]
    pub fn new(plate: impl Into<String>, make: impl Into<String>, model: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_entity_id(),
            tenant_id: None,
            plate: plate.into(),
            make: make.into(),
            model: model.into(),
            year: None,
            customer_id: None,
            notes: None,
            photo_path: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

impl Synchronizable for Vehicle {
    const KIND: EntityKind = EntityKind::Vehicle;

    fn id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn set_tenant_id(&mut self, tenant_id: TenantId) {
        self.tenant_id = Some(tenant_id);
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn set_updated_at(&mut self, updated_at: i64) {
        self.updated_at = updated_at;
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn set_deleted(&mut self) {
        self.is_deleted = true;
    }
}
