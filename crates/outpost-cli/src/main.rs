//! Outpost CLI - operator front-end for the offline-first sync engine
//!
//! Saves records into the local replica, pushes the mutation queue,
//! bootstraps from the shared remote store and follows its change feed.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::{run_add, run_delete};
use crate::commands::common::{open_session, resolve_db_path, Session, SessionOptions};
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::queue::run_queue;
use crate::commands::sync::{run_listen, run_pull, run_push};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "outpost=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = SessionOptions {
        db_path: resolve_db_path(cli.db_path),
        remote: cli.remote,
        tenant: cli.tenant,
        profile: cli.profile,
    };

    match cli.command {
        Commands::Config { command } => {
            run_config(command, options.profile.as_deref(), options.db_path)
        }
        command => {
            let session = open_session(&options)?;
            run_session_command(command, &session).await
        }
    }
}

async fn run_session_command(command: Commands, session: &Session) -> Result<(), CliError> {
    match command {
        Commands::Add { record } => run_add(record, session).await,
        Commands::Delete { kind, id } => run_delete(kind, &id, session).await,
        Commands::Push { json } => run_push(json, session).await,
        Commands::Pull { json } => run_pull(json, session).await,
        Commands::Listen => run_listen(session).await,
        Commands::Queue { command } => run_queue(command, session).await,
        Commands::Conflicts { command } => run_conflicts(command, session).await,
        Commands::Config { .. } => Ok(()),
    }
}
