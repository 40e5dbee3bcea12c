use outpost_core::db::SqliteEntityStore;
use outpost_core::mapping::FieldMapper;
use outpost_core::models::{
    now_millis, Customer, Employee, MutationOperation, ServiceOrder, Synchronizable, Vehicle,
};
use outpost_core::Mutation;

use crate::cli::{AddCommands, KindArg};
use crate::commands::common::Session;
use crate::error::CliError;

/// Build the entity an `add` subcommand describes
pub fn build_record(record: AddCommands) -> Record {
    match record {
        AddCommands::Vehicle {
            plate,
            make,
            model,
            year,
            customer,
        } => {
            let mut vehicle = Vehicle::new(plate, make, model);
            vehicle.year = year;
            vehicle.customer_id = customer;
            Record::Vehicle(vehicle)
        }
        AddCommands::Customer { name, phone, email } => {
            let mut customer = Customer::new(name);
            customer.phone = phone;
            customer.email = email;
            Record::Customer(customer)
        }
        AddCommands::Employee { name, role } => Record::Employee(Employee::new(name, role)),
        AddCommands::Order {
            vehicle,
            description,
            employee,
            total_cents,
        } => {
            let mut order = ServiceOrder::new(vehicle, description);
            order.assigned_employee_id = employee;
            order.total_cents = total_cents;
            Record::ServiceOrder(order)
        }
    }
}

/// One record of any registered type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Vehicle(Vehicle),
    Customer(Customer),
    Employee(Employee),
    ServiceOrder(ServiceOrder),
}

pub async fn run_add(record: AddCommands, session: &Session) -> Result<(), CliError> {
    let mutation = match build_record(record) {
        Record::Vehicle(entity) => save(session, MutationOperation::Create, entity).await?,
        Record::Customer(entity) => save(session, MutationOperation::Create, entity).await?,
        Record::Employee(entity) => save(session, MutationOperation::Create, entity).await?,
        Record::ServiceOrder(entity) => save(session, MutationOperation::Create, entity).await?,
    };

    println!("{}", mutation.entity_id);
    Ok(())
}

pub async fn run_delete(kind: KindArg, id: &str, session: &Session) -> Result<(), CliError> {
    let id = id.trim();
    match kind {
        KindArg::Vehicle => delete::<Vehicle>(session, id).await?,
        KindArg::Customer => delete::<Customer>(session, id).await?,
        KindArg::Employee => delete::<Employee>(session, id).await?,
        KindArg::Order => delete::<ServiceOrder>(session, id).await?,
    };

    println!("Deleted {id}");
    Ok(())
}

async fn save<E: FieldMapper>(
    session: &Session,
    operation: MutationOperation,
    entity: E,
) -> Result<Mutation, CliError> {
    Ok(session.sync.save(&session.ctx, operation, entity).await?)
}

/// Tombstone the stored entity with a fresh clock and queue the delete
async fn delete<E: FieldMapper>(session: &Session, id: &str) -> Result<Mutation, CliError> {
    let existing = {
        let db = session.sync.database().lock().await;
        SqliteEntityStore::new(db.connection()).get_entity::<E>(session.ctx.tenant_id(), id)?
    };
    let Some(mut entity) = existing else {
        return Err(CliError::RecordNotFound(id.to_string()));
    };

    entity.set_updated_at(now_millis().max(entity.updated_at() + 1));
    save(session, MutationOperation::Delete, entity).await
}
