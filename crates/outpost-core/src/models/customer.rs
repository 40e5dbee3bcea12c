//! Customer model

use serde::{Deserialize, Serialize};

use super::{new_entity_id, now_millis, EntityKind, Synchronizable, TenantId};

/// A shop customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Customer {
    #[must_use]
    pub fn new(full_name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_entity_id(),
            tenant_id: None,
            full_name: full_name.into(),
            phone: None,
            email: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

impl Synchronizable for Customer {
    const KIND: EntityKind = EntityKind::Customer;

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
