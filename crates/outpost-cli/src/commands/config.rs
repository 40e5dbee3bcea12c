use std::path::PathBuf;

use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::{print_json, resolve_remote_path, resolve_tenant};
use crate::config_profiles::{normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ResolvedProfile {
    profile: String,
    tenant_id: Option<String>,
    remote_path: PathBuf,
    db_path: PathBuf,
    batch_size: usize,
    max_retries: Option<u32>,
}

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    db_path: PathBuf,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            tenant_id,
            remote_path,
            batch_size,
            max_retries,
            no_activate,
        } => {
            let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = apply_config_init(
                &mut config,
                global_profile,
                tenant_id,
                remote_path,
                batch_size,
                max_retries,
                no_activate,
            )?;

            let path = config.save().map_err(CliError::Config)?;
            println!(
                "Profile '{}' initialized at {}",
                profile_name,
                path.display()
            );
            if config
                .profile(&profile_name)
                .and_then(|profile| profile.tenant_id())
                .is_none()
            {
                println!("Profile '{profile_name}' is missing: tenant_id");
            }
            Ok(())
        }
        ConfigCommands::Show { json } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(global_profile);
            let profile = config.profile(&profile_name).cloned().unwrap_or_default();
            let sync_config = profile.sync_config();

            let resolved = ResolvedProfile {
                tenant_id: resolve_tenant(None, &profile).ok(),
                remote_path: resolve_remote_path(None, profile.remote_path.as_deref()),
                db_path,
                batch_size: sync_config.batch_size,
                max_retries: sync_config.max_retries,
                profile: profile_name,
            };

            if json {
                return print_json(&resolved);
            }
            println!("profile      {}", resolved.profile);
            println!(
                "tenant_id    {}",
                resolved.tenant_id.as_deref().unwrap_or("(not set)")
            );
            println!("remote_path  {}", resolved.remote_path.display());
            println!("db_path      {}", resolved.db_path.display());
            println!("batch_size   {}", resolved.batch_size);
            match resolved.max_retries {
                Some(max) => println!("max_retries  {max}"),
                None => println!("max_retries  unbounded"),
            }
            Ok(())
        }
    }
}

/// Merge explicit values into the named profile; returns the profile name
pub fn apply_config_init(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    tenant_id: Option<String>,
    remote_path: Option<PathBuf>,
    batch_size: Option<usize>,
    max_retries: Option<u32>,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);

    if batch_size == Some(0) {
        return Err(CliError::Config(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = normalize_text_option(tenant_id) {
        profile.tenant_id = Some(value);
    }
    if let Some(value) = remote_path {
        profile.remote_path = Some(value);
    }
    if let Some(value) = batch_size {
        profile.batch_size = Some(value);
    }
    if let Some(value) = max_retries {
        profile.max_retries = Some(value);
    }

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}
