//! Customer <-> `customers` table

use serde_json::{json, Value};

use super::{format_timestamp, FieldMapper, MappingError, RemoteRow, RowReader};
use crate::models::{Customer, EntityKind};

const TABLE: &str = EntityKind::Customer.remote_table();

impl FieldMapper for Customer {
    fn to_remote(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), json!(self.id));
        if let Some(tenant_id) = &self.tenant_id {
            row.insert("tenant_id".into(), json!(tenant_id.as_str()));
        }
        row.insert("name".into(), json!(self.full_name));
        row.insert("phone_number".into(), json!(self.phone));
        row.insert("email".into(), json!(self.email));
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
            full_name: reader.required_str("name")?,
            phone: reader.optional_str("phone_number")?,
            email: reader.optional_str("email")?,
            created_at: reader.required_timestamp("created_at")?,
            updated_at: reader.required_timestamp("updated_at")?,
            is_deleted: reader.bool_or("is_deleted", false)?,
        })
    }
}
