//! Error types for outpost-core

use thiserror::Error;

use crate::mapping::MappingError;
use crate::remote::RemoteError;

/// Result type alias using outpost-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in outpost-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A mutation payload carried no usable entity identifier
    #[error("Refusing to enqueue {entity_type} mutation without an entity id")]
    MissingEntityId { entity_type: String },

    /// A payload claims a tenant other than the active session tenant
    #[error("Tenant mismatch: session is {expected}, payload claims {found}")]
    TenantMismatch { expected: String, found: String },

    /// Local and remote representations could not be translated
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Remote store error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A core table could not be pulled, so the session is not ready
    #[error("Bootstrap aborted while pulling {table}: {reason}")]
    BootstrapAborted { table: String, reason: String },

    /// Bootstrap did not finish before its deadline
    #[error("Bootstrap timed out after {0:?}")]
    BootstrapTimedOut(std::time::Duration),
}
