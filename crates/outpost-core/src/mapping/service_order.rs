//! `ServiceOrder` <-> `service_orders` table

use serde_json::{json, Value};

use super::{format_timestamp, FieldMapper, MappingError, RemoteRow, RowReader};
use crate::models::{EntityKind, ServiceOrder, ServiceOrderStatus};

const TABLE: &str = EntityKind::ServiceOrder.remote_table();

impl FieldMapper for ServiceOrder {
    fn to_remote(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), json!(self.id));
        if let Some(tenant_id) = &self.tenant_id {
            row.insert("tenant_id".into(), json!(tenant_id.as_str()));
        }
        row.insert("vehicle_id".into(), json!(self.vehicle_id));
        row.insert("customer_id".into(), json!(self.customer_id));
        row.insert("employee_id".into(), json!(self.assigned_employee_id));
        row.insert("status".into(), json!(self.status.as_str()));
        row.insert("description".into(), json!(self.description));
        row.insert("total_cents".into(), json!(self.total_cents));
        row.insert("created_at".into(), Value::String(format_timestamp(self.created_at)));
        row.insert("updated_at".into(), Value::String(format_timestamp(self.updated_at)));
        row.insert("is_deleted".into(), json!(self.is_deleted));
        row
    }

    fn from_remote(row: &RemoteRow) -> Result<Self, MappingError> {
        let reader = RowReader::new(TABLE, row);
        let status = match reader.optional_str("status")? {
            Some(raw) => raw
                .parse::<ServiceOrderStatus>()
                .map_err(|reason| MappingError::InvalidField {
                    table: TABLE,
                    field: "status".into(),
                    reason,
                })?,
            None => ServiceOrderStatus::default(),
        };

        Ok(Self {
            id: reader.required_str("id")?,
            tenant_id: reader.tenant()?,
            vehicle_id: reader.required_str("vehicle_id")?,
            customer_id: reader.optional_str("customer_id")?,
            assigned_employee_id: reader.optional_str("employee_id")?,
            status,
            description: reader.required_str("description")?,
            total_cents: reader.optional_i64("total_cents")?.unwrap_or_default(),
            created_at: reader.required_timestamp("created_at")?,
            updated_at: reader.required_timestamp("updated_at")?,
            is_deleted: reader.bool_or("is_deleted", false)?,
        })
    }
}
