use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] outpost_core::Error),
    #[error(transparent)]
    Remote(#[from] outpost_core::remote::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No tenant configured. Run `outpost config init --tenant-id <ID>`, pass --tenant, or set OUTPOST_TENANT."
    )]
    TenantNotConfigured,
}
