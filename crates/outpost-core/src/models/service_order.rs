//! Service order model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{new_entity_id, now_millis, EntityKind, Synchronizable, TenantId};

/// Workflow position of a service order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOrderStatus {
    #[default]
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceOrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ServiceOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown service order status '{other}'")),
        }
    }
}

/// A unit of work performed on a vehicle.
///
/// `total_cents` is whatever the billing layer computed; the sync engine
/// carries it without interpreting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrder {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub vehicle_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub assigned_employee_id: Option<String>,
    #[serde(default)]
    pub status: ServiceOrderStatus,
    pub description: String,
    #[serde(default)]
    pub total_cents: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

impl ServiceOrder {
    #[must_use]
    pub fn new(vehicle_id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: new_entity_id(),
            tenant_id: None,
            vehicle_id: vehicle_id.into(),
            customer_id: None,
            assigned_employee_id: None,
            status: ServiceOrderStatus::Open,
            description: description.into(),
            total_cents: 0,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

impl Synchronizable for ServiceOrder {
    const KIND: EntityKind = EntityKind::ServiceOrder;

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
