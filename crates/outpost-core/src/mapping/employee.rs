//! Employee <-> `employees` table

use serde_json::{json, Value};

use super::{format_timestamp, FieldMapper, MappingError, RemoteRow, RowReader};
use crate::models::{Employee, EntityKind};

const TABLE: &str = EntityKind::Employee.remote_table();

impl FieldMapper for Employee {
    fn to_remote(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), json!(self.id));
        if let Some(tenant_id) = &self.tenant_id {
            row.insert("tenant_id".into(), json!(tenant_id.as_str()));
        }
        row.insert("display_name".into(), json!(self.display_name));
        row.insert("role".into(), json!(self.role));
        row.insert("is_active".into(), json!(self.active));
        row.insert("created_at".into(), Value::String(format_timestamp(self.created_at)));
        row.insert("updated_at".into(), Value::String(format_timestamp(self.updated_at)));
        row.insert("is_deleted".into(), json!(self.is_deleted));
        row
    }

    fn from_remote(row: &RemoteRow) -> Result<Self, MappingError> {
        let reader = RowReader::new(TABLE, row);
        Ok(Self {
            id: reader.required_str("id")?,
            tenant_id: reader.tenant()?,
            display_name: reader.required_str("display_name")?,
            role: reader.required_str("role")?,
            active: reader.bool_or("is_active", true)?,
            created_at: reader.required_timestamp("created_at")?,
            updated_at: reader.required_timestamp("updated_at")?,
            is_deleted: reader.bool_or("is_deleted", false)?,
        })
    }
}
