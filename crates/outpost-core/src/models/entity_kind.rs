//! Closed registry of synchronizable entity types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Every entity type the sync engine knows how to push and pull.
///
/// Table names, criticality, and mappers are resolved with exhaustive
/// matches on this enum, so adding a variant without wiring both sync
/// directions does not compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Vehicle,
    Customer,
    Employee,
    ServiceOrder,
}

impl EntityKind {
    /// All registered kinds, in bootstrap order
    pub const ALL: [Self; 4] = [
        Self::Vehicle,
        Self::Customer,
        Self::Employee,
        Self::ServiceOrder,
    ];

    /// Name stored in the mutation log and local store
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Customer => "customer",
            Self::Employee => "employee",
            Self::ServiceOrder => "service_order",
        }
    }

    /// Remote table backing this kind
    pub const fn remote_table(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicles",
            Self::Customer => "customers",
            Self::Employee => "employees",
            Self::ServiceOrder => "service_orders",
        }
    }

    /// Core tables must hydrate for a session to be ready
    pub const fn is_core(self) -> bool {
        match self {
            Self::Vehicle | Self::Customer | Self::ServiceOrder => true,
            Self::Employee => false,
        }
    }

    /// Resolve the kind that owns a remote table
    pub fn from_remote_table(table: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.remote_table() == table)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity type: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            assert_eq!(EntityKind::from_remote_table(kind.remote_table()), Some(kind));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!("invoice".parse::<EntityKind>().is_err());
        assert_eq!(EntityKind::from_remote_table("invoices"), None);
    }

    #[test]
    fn only_employees_are_non_critical() {
        let non_core: Vec<_> = EntityKind::ALL
            .into_iter()
            .filter(|kind| !kind.is_core())
            .collect();
        assert_eq!(non_core, vec![EntityKind::Employee]);
    }
}
