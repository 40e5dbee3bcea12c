use outpost_core::db::{ConflictRepository, SqliteConflictRepository};

use crate::cli::ConflictCommands;
use crate::commands::common::{
    format_sync_conflict_lines, print_json, sync_conflict_to_item, Session, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_conflicts(command: ConflictCommands, session: &Session) -> Result<(), CliError> {
    match command {
        ConflictCommands::List { limit, all, json } => {
            run_conflicts_list(limit, !all, json, session).await
        }
        ConflictCommands::Resolve { id } => {
            {
                let db = session.sync.database().lock().await;
                SqliteConflictRepository::new(db.connection()).mark_resolved(id)?;
            }
            println!("Conflict #{id} resolved");
            Ok(())
        }
    }
}

async fn run_conflicts_list(
    limit: usize,
    unresolved_only: bool,
    as_json: bool,
    session: &Session,
) -> Result<(), CliError> {
    let conflicts = {
        let db = session.sync.database().lock().await;
        SqliteConflictRepository::new(db.connection()).list(limit, unresolved_only)?
    };

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        return print_json(&json_items);
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
