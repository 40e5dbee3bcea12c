//! Typed column access for remote rows

use serde_json::Value;

use super::{parse_timestamp, MappingError, RemoteRow, TENANT_COLUMN};
use crate::models::TenantId;

/// Reads columns from one row of `table`, reporting field-level errors
pub struct RowReader<'a> {
    table: &'static str,
    row: &'a RemoteRow,
}

impl<'a> RowReader<'a> {
    pub const fn new(table: &'static str, row: &'a RemoteRow) -> Self {
        Self { table, row }
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.row.get(field).filter(|value| !value.is_null())
    }

    fn missing(&self, field: &str) -> MappingError {
        MappingError::MissingField {
            table: self.table,
            field: field.to_string(),
        }
    }

    fn invalid(&self, field: &str, reason: impl Into<String>) -> MappingError {
        MappingError::InvalidField {
            table: self.table,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn required_str(&self, field: &str) -> Result<String, MappingError> {
        self.optional_str(field)?.ok_or_else(|| self.missing(field))
    }

    pub fn optional_str(&self, field: &str) -> Result<Option<String>, MappingError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(other) => Err(self.invalid(field, format!("expected text, got {other}"))),
        }
    }

    pub fn optional_i64(&self, field: &str) -> Result<Option<i64>, MappingError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::Number(number)) => number
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(field, "expected an integer")),
            Some(other) => Err(self.invalid(field, format!("expected integer, got {other}"))),
        }
    }

    pub fn optional_i32(&self, field: &str) -> Result<Option<i32>, MappingError> {
        self.optional_i64(field)?
            .map(|value| i32::try_from(value).map_err(|_| self.invalid(field, "out of range")))
            .transpose()
    }

    pub fn bool_or(&self, field: &str, default: bool) -> Result<bool, MappingError> {
        match self.present(field) {
            None => Ok(default),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(other) => Err(self.invalid(field, format!("expected boolean, got {other}"))),
        }
    }

    /// Timestamp column as Unix ms
    pub fn required_timestamp(&self, field: &str) -> Result<i64, MappingError> {
        match self.present(field) {
            None => Err(self.missing(field)),
            Some(Value::String(text)) => {
                parse_timestamp(text).ok_or_else(|| self.invalid(field, "not an RFC 3339 timestamp"))
            }
            Some(Value::Number(number)) => number
                .as_i64()
                .ok_or_else(|| self.invalid(field, "expected integer milliseconds")),
            Some(other) => Err(self.invalid(field, format!("expected timestamp, got {other}"))),
        }
    }

    pub fn tenant(&self) -> Result<Option<TenantId>, MappingError> {
        Ok(self
            .optional_str(TENANT_COLUMN)?
            .and_then(|tenant| TenantId::new(tenant).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn null_counts_as_missing() {
        let row = row(json!({ "name": null }));
        let reader = RowReader::new("customers", &row);
        assert_eq!(reader.optional_str("name"), Ok(None));
        assert_eq!(
            reader.required_str("name"),
            Err(MappingError::MissingField {
                table: "customers",
                field: "name".into()
            })
        );
    }

    #[test]
    fn wrong_types_are_reported() {
        let row = row(json!({ "model_year": "2019", "is_active": 1 }));
        let reader = RowReader::new("vehicles", &row);
        assert!(reader.optional_i32("model_year").is_err());
        assert!(reader.bool_or("is_active", true).is_err());
    }

    #[test]
    fn blank_tenant_reads_as_absent() {
        let row = row(json!({ "tenant_id": "  " }));
        assert_eq!(RowReader::new("vehicles", &row).tenant(), Ok(None));
    }
}
