use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use outpost_core::db::Database;
use outpost_core::models::{Mutation, SyncConflict};
use outpost_core::remote::SqliteRemoteStore;
use outpost_core::{SyncService, TenantContext, TenantId};
use serde::Serialize;

use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Paths and tenant a command acts on, resolved from flags, env and profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub db_path: PathBuf,
    /// Remote store file given on the command line
    pub remote: Option<PathBuf>,
    pub tenant: Option<String>,
    pub profile: Option<String>,
}

/// An opened local database and remote store for one tenant
pub struct Session {
    pub ctx: TenantContext,
    pub sync: SyncService<SqliteRemoteStore>,
}

#[derive(Debug, Serialize)]
pub struct MutationItem {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub status: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub timestamp: i64,
    pub timestamp_iso: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub mutation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub error: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub resolved: bool,
}

pub fn open_session(options: &SessionOptions) -> Result<Session, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(options.profile.as_deref());
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    open_session_with_profile(options, &profile)
}

pub fn open_session_with_profile(
    options: &SessionOptions,
    profile: &CliProfile,
) -> Result<Session, CliError> {
    let tenant = resolve_tenant(options.tenant.clone(), profile)?;
    let ctx = TenantContext::new(TenantId::new(tenant)?);
    let remote_path = resolve_remote_path(options.remote.clone(), profile.remote_path.as_deref());

    for path in [&options.db_path, &remote_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::open(&options.db_path)?;
    let remote = SqliteRemoteStore::open(&remote_path)?;
    tracing::debug!(
        tenant = %ctx.tenant_id(),
        db = %options.db_path.display(),
        remote = %remote_path.display(),
        "Opened session"
    );

    let sync = SyncService::new(db, Arc::new(remote), profile.sync_config());
    Ok(Session { ctx, sync })
}

pub fn resolve_tenant(explicit: Option<String>, profile: &CliProfile) -> Result<String, CliError> {
    normalize_text_option(explicit)
        .or_else(|| normalize_text_option(env::var("OUTPOST_TENANT").ok()))
        .or_else(|| profile.tenant_id())
        .ok_or(CliError::TenantNotConfigured)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("OUTPOST_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

/// Remote store file: flag, then `OUTPOST_REMOTE_PATH`, then the profile
pub fn resolve_remote_path(cli_remote: Option<PathBuf>, profile: Option<&Path>) -> PathBuf {
    cli_remote
        .or_else(|| env::var_os("OUTPOST_REMOTE_PATH").map(PathBuf::from))
        .or_else(|| profile.map(Path::to_path_buf))
        .unwrap_or_else(default_remote_path)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("outpost")
}

pub fn default_db_path() -> PathBuf {
    data_dir().join("outpost.db")
}

pub fn default_remote_path() -> PathBuf {
    data_dir().join("remote.db")
}

pub fn mutation_to_item(mutation: &Mutation) -> MutationItem {
    MutationItem {
        id: mutation.id.to_string(),
        entity_type: mutation.entity_type.clone(),
        entity_id: mutation.entity_id.clone(),
        operation: mutation.operation.to_string(),
        status: mutation.status.to_string(),
        retry_count: mutation.retry_count,
        last_error: mutation.last_error.clone(),
        timestamp: mutation.timestamp,
        timestamp_iso: format_sync_timestamp(mutation.timestamp),
    }
}

pub fn format_mutation_lines(mutations: &[Mutation]) -> Vec<String> {
    mutations
        .iter()
        .map(|mutation| {
            let id = mutation.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let line = format!(
                "{short_id:<13}  {}  {:<6}  {:<13}  {}  {:<15}",
                format_sync_timestamp(mutation.timestamp),
                mutation.operation,
                mutation.entity_type,
                mutation.entity_id,
                mutation.status,
            );
            match &mutation.last_error {
                Some(error) => format!("{line}  retries={} ({error})", mutation.retry_count),
                None => line,
            }
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        mutation_id: conflict.mutation_id.clone(),
        entity_type: conflict.entity_type.clone(),
        entity_id: conflict.entity_id.clone(),
        error: conflict.error.clone(),
        timestamp: conflict.timestamp,
        timestamp_iso: format_sync_timestamp(conflict.timestamp),
        resolved: conflict.resolved,
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let marker = if conflict.resolved { "resolved" } else { "open" };
            format!(
                "#{:<5} {}  {:<8}  {}={}  {}",
                conflict.id,
                format_sync_timestamp(conflict.timestamp),
                marker,
                conflict.entity_type,
                conflict.entity_id,
                conflict.error
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
