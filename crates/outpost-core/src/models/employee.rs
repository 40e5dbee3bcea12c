//! Employee model

use serde::{Deserialize, Serialize};

use super::{new_entity_id, now_millis, EntityKind, Synchronizable, TenantId};

/// A staff member who can be assigned to service orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub display_name: String,
    /// Free-form role label ("mechanic", "front desk", ...)
    pub role: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

const fn default_active() -> bool {
    true
}

impl Employee {
    #[must_use]
    pub fn new(display_name: impl Into<String>, role: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_entity_id(),
            tenant_id: None,
            display_name: display_name.into(),
            role: role.into(),
            active: true,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

impl Synchronizable for Employee {
    const KIND: EntityKind = EntityKind::Employee;

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
