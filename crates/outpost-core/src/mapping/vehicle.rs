//! Vehicle <-> `vehicles` table

use serde_json::{json, Value};

use super::{format_timestamp, FieldMapper, MappingError, RemoteRow, RowReader};
use crate::models::{EntityKind, Vehicle};

const TABLE: &str = EntityKind::Vehicle.remote_table();

impl FieldMapper for Vehicle {
    const LOCAL_ONLY_FIELDS: &'static [&'static str] = &["photoPath"];

    fn to_remote(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), json!(self.id));
        if let Some(tenant_id) = &self.tenant_id {
            row.insert("tenant_id".into(), json!(tenant_id.as_str()));
        }
        row.insert("license_plate".into(), json!(self.plate));
        row.insert("make".into(), json!(self.make));
        row.insert("model".into(), json!(self.model));
        row.insert("model_year".into(), json!(self.year));
        row.insert("owner_id".into(), json!(self.customer_id));
        row.insert("notes".into(), json!(self.notes));
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
            plate: reader.required_str("license_plate")?,
            make: reader.required_str("make")?,
            model: reader.required_str("model")?,
            year: reader.optional_i32("model_year")?,
            customer_id: reader.optional_str("owner_id")?,
            notes: reader.optional_str("notes")?,
            photo_path: None,
            created_at: reader.required_timestamp("created_at")?,
            updated_at: reader.required_timestamp("updated_at")?,
            is_deleted: reader.bool_or("is_deleted", false)?,
        })
    }
}
