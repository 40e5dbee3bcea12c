//! Bidirectional translation between local entities and remote rows.
//!
//! Local documents are the camelCase JSON form of the model structs. Remote
//! rows are snake_case column maps with RFC 3339 timestamps. Each entity type
//! implements [`FieldMapper`]; the functions at the bottom of this module
//! dispatch on [`EntityKind`] with exhaustive matches, so every registered
//! type supports both directions.

mod customer;
mod employee;
mod row;
mod service_order;
mod vehicle;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::models::{
    Customer, Employee, EntityKind, ServiceOrder, Synchronizable, TenantContext, Vehicle,
};

pub use row::RowReader;

/// A remote table row, keyed by column name
pub type RemoteRow = serde_json::Map<String, Value>;

/// Column names every remote table carries
pub const ID_COLUMN: &str = "id";
pub const TENANT_COLUMN: &str = "tenant_id";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Errors raised while translating between representations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("{table}: missing required field '{field}'")]
    MissingField { table: &'static str, field: String },

    #[error("{table}: invalid value for '{field}': {reason}")]
    InvalidField {
        table: &'static str,
        field: String,
        reason: String,
    },

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: EntityKind, reason: String },
}

/// Per-type translation between the local model and its remote row
pub trait FieldMapper: Synchronizable {
    /// Local fields that intentionally have no remote column
    const LOCAL_ONLY_FIELDS: &'static [&'static str] = &[];

    fn to_remote(&self) -> RemoteRow;

    fn from_remote(row: &RemoteRow) -> std::result::Result<Self, MappingError>;
}

/// A local payload translated for an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub entity_id: String,
    /// Snapshot's own `updatedAt`, the LWW clock
    pub updated_at: i64,
    pub row: RemoteRow,
}

/// A remote row translated into its local representation
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDocument {
    pub kind: EntityKind,
    pub entity_id: String,
    pub tenant_id: String,
    pub updated_at: i64,
    pub is_deleted: bool,
    pub document: Value,
}

impl LocalDocument {
    /// Build the stored form of a typed entity that is already tenant-bound
    pub fn from_entity<E: Synchronizable>(entity: &E, ctx: &TenantContext) -> Result<Self> {
        Ok(Self {
            kind: E::KIND,
            entity_id: entity.id().to_string(),
            tenant_id: ctx.tenant_id().to_string(),
            updated_at: entity.updated_at(),
            is_deleted: entity.is_deleted(),
            document: serde_json::to_value(entity)?,
        })
    }
}

/// Attach the session tenant to an entity, refusing to overwrite another one.
pub fn bind_tenant<E: Synchronizable>(entity: &mut E, ctx: &TenantContext) -> Result<()> {
    match entity.tenant_id() {
        Some(existing) if !existing.as_str().is_empty() => {
            if existing == ctx.tenant_id() {
                Ok(())
            } else {
                Err(Error::TenantMismatch {
                    expected: ctx.tenant_id().to_string(),
                    found: existing.to_string(),
                })
            }
        }
        _ => {
            entity.set_tenant_id(ctx.tenant_id().clone());
            Ok(())
        }
    }
}

/// Map a local payload of `kind` into a remote row stamped with the session tenant
pub fn prepare_write(kind: EntityKind, payload: &Value, ctx: &TenantContext) -> Result<PreparedWrite> {
    match kind {
        EntityKind::Vehicle => prepare_typed::<Vehicle>(payload, ctx),
        EntityKind::Customer => prepare_typed::<Customer>(payload, ctx),
        EntityKind::Employee => prepare_typed::<Employee>(payload, ctx),
        EntityKind::ServiceOrder => prepare_typed::<ServiceOrder>(payload, ctx),
    }
}

/// Map a remote row of `kind` into a local document owned by the session tenant
pub fn to_local_document(
    kind: EntityKind,
    row: &RemoteRow,
    ctx: &TenantContext,
) -> Result<LocalDocument> {
    match kind {
        EntityKind::Vehicle => local_typed::<Vehicle>(row, ctx),
        EntityKind::Customer => local_typed::<Customer>(row, ctx),
        EntityKind::Employee => local_typed::<Employee>(row, ctx),
        EntityKind::ServiceOrder => local_typed::<ServiceOrder>(row, ctx),
    }
}

/// Fields of `kind` that inbound rows never carry
pub const fn local_only_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Vehicle => Vehicle::LOCAL_ONLY_FIELDS,
        EntityKind::Customer => Customer::LOCAL_ONLY_FIELDS,
        EntityKind::Employee => Employee::LOCAL_ONLY_FIELDS,
        EntityKind::ServiceOrder => ServiceOrder::LOCAL_ONLY_FIELDS,
    }
}

/// Read the identifier a local payload claims, if any.
///
/// Blank ids count as missing; any other id is returned exactly as stored.
pub fn payload_entity_id(payload: &Value) -> Option<&str> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

/// Read the tenant a local payload claims, if any
pub fn payload_tenant_id(payload: &Value) -> Option<&str> {
    payload
        .get("tenantId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|tenant| !tenant.is_empty())
}

/// Read a row's `updated_at` as Unix ms, accepting RFC 3339 text or integers
pub fn row_updated_at(row: &RemoteRow) -> Option<i64> {
    match row.get(UPDATED_AT_COLUMN)? {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}

/// Read a row's tenant column
pub fn row_tenant_id(row: &RemoteRow) -> Option<&str> {
    row.get(TENANT_COLUMN).and_then(Value::as_str)
}

/// Read a row's primary id column
pub fn row_id(row: &RemoteRow) -> Option<&str> {
    row.get(ID_COLUMN).and_then(Value::as_str)
}

/// Render Unix ms as the remote timestamp format.
///
/// Out-of-range values render as the epoch; [`prepare_write`] rejects them
/// before a row is built.
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a remote timestamp into Unix ms
pub fn parse_timestamp(text: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|parsed| parsed.timestamp_millis())
}

/// Copy local-only fields from the stored document into an incoming one
pub fn carry_local_only_fields(kind: EntityKind, existing: &Value, incoming: &mut Value) {
    let (Some(existing), Some(incoming)) = (existing.as_object(), incoming.as_object_mut()) else {
        return;
    };
    for field in local_only_fields(kind) {
        if let Some(value) = existing.get(*field) {
            incoming.insert((*field).to_string(), value.clone());
        }
    }
}

fn prepare_typed<E: FieldMapper>(payload: &Value, ctx: &TenantContext) -> Result<PreparedWrite> {
    let mut entity: E =
        serde_json::from_value(payload.clone()).map_err(|error| MappingError::InvalidPayload {
            kind: E::KIND,
            reason: error.to_string(),
        })?;
    bind_tenant(&mut entity, ctx)?;
    check_timestamp(E::KIND, "updated_at", entity.updated_at())?;
    if let Some(created_at) = payload.get("createdAt").and_then(Value::as_i64) {
        check_timestamp(E::KIND, "created_at", created_at)?;
    }

    let mut row = entity.to_remote();
    row.insert(
        TENANT_COLUMN.to_string(),
        Value::String(ctx.tenant_id().to_string()),
    );

    Ok(PreparedWrite {
        entity_id: entity.id().to_string(),
        updated_at: entity.updated_at(),
        row,
    })
}

fn check_timestamp(
    kind: EntityKind,
    field: &str,
    millis: i64,
) -> std::result::Result<(), MappingError> {
    if DateTime::<Utc>::from_timestamp_millis(millis).is_some() {
        return Ok(());
    }
    Err(MappingError::InvalidField {
        table: kind.remote_table(),
        field: field.to_string(),
        reason: format!("{millis} ms is outside the representable timestamp range"),
    })
}

fn local_typed<E: FieldMapper>(row: &RemoteRow, ctx: &TenantContext) -> Result<LocalDocument> {
    let mut entity = E::from_remote(row)?;
    bind_tenant(&mut entity, ctx)?;
    LocalDocument::from_entity(&entity, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ServiceOrderStatus, TenantId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx(tenant: &str) -> TenantContext {
        TenantContext::new(TenantId::new(tenant).unwrap())
    }

    fn bound<E: Synchronizable>(mut entity: E, tenant: &str) -> E {
        entity.set_tenant_id(TenantId::new(tenant).unwrap());
        entity
    }

    fn assert_round_trip<E: FieldMapper + PartialEq + std::fmt::Debug>(entity: &E) {
        let back = E::from_remote(&entity.to_remote()).unwrap();
        assert_eq!(&back, entity);
    }

    #[test]
    fn vehicle_round_trips_shared_fields() {
        let mut vehicle = bound(Vehicle::new("KL-221", "Ford", "Transit"), "g1");
        vehicle.year = Some(2019);
        vehicle.customer_id = Some("cust-1".into());
        vehicle.notes = Some("Left mirror cracked".into());
        assert_round_trip(&vehicle);
    }

    #[test]
    fn vehicle_photo_path_never_reaches_remote() {
        let mut vehicle = bound(Vehicle::new("KL-221", "Ford", "Transit"), "g1");
        vehicle.photo_path = Some("/data/photos/kl221.jpg".into());

        let row = vehicle.to_remote();
        assert!(row.values().all(|value| value != "/data/photos/kl221.jpg"));
        assert_eq!(Vehicle::LOCAL_ONLY_FIELDS, &["photoPath"]);

        let back = Vehicle::from_remote(&row).unwrap();
        assert_eq!(back.photo_path, None);
        assert_eq!(back.plate, vehicle.plate);
    }

    #[test]
    fn customer_round_trips_shared_fields() {
        let mut customer = bound(Customer::new("Ana Ruiz"), "g1");
        customer.phone = Some("+34 600 000 000".into());
        customer.email = Some("ana@example.com".into());
        customer.is_deleted = true;
        assert_round_trip(&customer);
    }

    #[test]
    fn employee_round_trips_shared_fields() {
        let mut employee = bound(Employee::new("Kim", "mechanic"), "g1");
        employee.active = false;
        assert_round_trip(&employee);
    }

    #[test]
    fn service_order_round_trips_shared_fields() {
        let mut order = bound(ServiceOrder::new("veh-1", "Oil change"), "g1");
        order.customer_id = Some("cust-1".into());
        order.assigned_employee_id = Some("emp-1".into());
        order.status = ServiceOrderStatus::InProgress;
        order.total_cents = 12_950;
        assert_round_trip(&order);
    }

    #[test]
    fn prepare_write_injects_missing_tenant() {
        let vehicle = Vehicle::new("AB-1", "Seat", "Ibiza");
        let payload = serde_json::to_value(&vehicle).unwrap();
        assert!(payload_tenant_id(&payload).is_none());

        let prepared = prepare_write(EntityKind::Vehicle, &payload, &ctx("g1")).unwrap();
        assert_eq!(row_tenant_id(&prepared.row), Some("g1"));
        assert_eq!(prepared.entity_id, vehicle.id);
        assert_eq!(prepared.updated_at, vehicle.updated_at);
    }

    #[test]
    fn prepare_write_rejects_foreign_tenant() {
        let vehicle = bound(Vehicle::new("AB-1", "Seat", "Ibiza"), "other");
        let payload = serde_json::to_value(&vehicle).unwrap();

        let error = prepare_write(EntityKind::Vehicle, &payload, &ctx("g1")).unwrap_err();
        assert!(matches!(
            error,
            Error::TenantMismatch { ref expected, ref found } if expected == "g1" && found == "other"
        ));
    }

    #[test]
    fn prepare_write_reports_missing_fields_as_mapping_errors() {
        let payload = json!({ "id": "veh-1", "plate": "X" });
        let error = prepare_write(EntityKind::Vehicle, &payload, &ctx("g1")).unwrap_err();
        assert!(matches!(
            error,
            Error::Mapping(MappingError::InvalidPayload { kind: EntityKind::Vehicle, .. })
        ));
    }

    #[test]
    fn to_local_document_rejects_foreign_rows() {
        let customer = bound(Customer::new("Ana"), "other");
        let row = customer.to_remote();
        assert!(to_local_document(EntityKind::Customer, &row, &ctx("g1")).is_err());
    }

    #[test]
    fn to_local_document_uses_local_field_names() {
        let customer = bound(Customer::new("Ana"), "g1");
        let row = customer.to_remote();
        assert_eq!(row.get("name"), Some(&json!("Ana")));

        let local = to_local_document(EntityKind::Customer, &row, &ctx("g1")).unwrap();
        assert_eq!(local.entity_id, customer.id);
        assert_eq!(local.tenant_id, "g1");
        assert_eq!(local.document["fullName"], json!("Ana"));
        assert_eq!(local.updated_at, customer.updated_at);
    }

    #[test]
    fn timestamps_survive_formatting_at_millisecond_precision() {
        let millis = 1_723_456_789_123;
        let text = format_timestamp(millis);
        assert_eq!(text, "2024-08-12T09:59:49.123Z");
        assert_eq!(parse_timestamp(&text), Some(millis));
    }

    #[test]
    fn prepare_write_rejects_unrepresentable_clocks() {
        let mut vehicle = Vehicle::new("AB-1", "Seat", "Ibiza");
        vehicle.updated_at = i64::MAX;
        let payload = serde_json::to_value(&vehicle).unwrap();

        let error = prepare_write(EntityKind::Vehicle, &payload, &ctx("g1")).unwrap_err();
        assert!(matches!(
            error,
            Error::Mapping(MappingError::InvalidField { table: "vehicles", ref field, .. })
                if field == "updated_at"
        ));
    }

    #[test]
    fn row_updated_at_accepts_text_and_integers() {
        let mut row = RemoteRow::new();
        row.insert(UPDATED_AT_COLUMN.into(), json!("2024-08-12T09:59:49.123Z"));
        assert_eq!(row_updated_at(&row), Some(1_723_456_789_123));
        row.insert(UPDATED_AT_COLUMN.into(), json!(42));
        assert_eq!(row_updated_at(&row), Some(42));
        row.insert(UPDATED_AT_COLUMN.into(), json!(true));
        assert_eq!(row_updated_at(&row), None);
    }

    #[test]
    fn carry_local_only_fields_keeps_device_state() {
        let existing = json!({ "id": "v1", "photoPath": "/p.jpg", "plate": "OLD" });
        let mut incoming = json!({ "id": "v1", "plate": "NEW" });
        carry_local_only_fields(EntityKind::Vehicle, &existing, &mut incoming);
        assert_eq!(incoming, json!({ "id": "v1", "plate": "NEW", "photoPath": "/p.jpg" }));
    }

    #[test]
    fn payload_entity_id_ignores_blank_ids() {
        assert_eq!(payload_entity_id(&json!({ "id": " v1 " })), Some(" v1 "));
        assert_eq!(payload_entity_id(&json!({ "id": "  " })), None);
        assert_eq!(payload_entity_id(&json!({ "plate": "X" })), None);
    }
}
