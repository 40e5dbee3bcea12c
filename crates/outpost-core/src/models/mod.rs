//! Data models for Outpost

mod customer;
mod employee;
mod entity_kind;
mod mutation;
mod service_order;
mod sync_conflict;
mod tenant;
mod vehicle;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use customer::Customer;
pub use employee::Employee;
pub use entity_kind::EntityKind;
pub use mutation::{Mutation, MutationId, MutationOperation, MutationStatus};
pub use service_order::{ServiceOrder, ServiceOrderStatus};
pub use sync_conflict::SyncConflict;
pub use tenant::{TenantContext, TenantId};
pub use vehicle::Vehicle;

/// A domain object the sync engine can push and pull.
///
/// The primary id is assigned once by whichever side creates the entity and
/// is never regenerated. `updated_at` is the last-write-wins clock.
pub trait Synchronizable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Registry entry for this type
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn tenant_id(&self) -> Option<&TenantId>;

    fn set_tenant_id(&mut self, tenant_id: TenantId);

    fn updated_at(&self) -> i64;

    fn set_updated_at(&mut self, updated_at: i64);

    fn is_deleted(&self) -> bool;

    /// Turn the entity into a tombstone
    fn set_deleted(&mut self);

    /// Bump the LWW clock to now
    fn touch(&mut self) {
        self.set_updated_at(now_millis());
    }
}

/// Current time in Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh UUID v7 primary id for a locally created entity
pub fn new_entity_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
