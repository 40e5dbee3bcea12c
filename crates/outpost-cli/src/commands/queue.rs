use std::collections::BTreeMap;

use outpost_core::db::{MutationQueue, SqliteMutationQueue};

use crate::cli::QueueCommands;
use crate::commands::common::{
    format_mutation_lines, mutation_to_item, print_json, MutationItem, Session,
};
use crate::error::CliError;

pub async fn run_queue(command: QueueCommands, session: &Session) -> Result<(), CliError> {
    match command {
        QueueCommands::Status { json } => run_queue_status(json, session).await,
        QueueCommands::List {
            status,
            limit,
            json,
        } => {
            let mutations = {
                let db = session.sync.database().lock().await;
                SqliteMutationQueue::new(db.connection()).list(
                    session.ctx.tenant_id(),
                    status.map(Into::into),
                    limit,
                )?
            };

            if json {
                let items = mutations
                    .iter()
                    .map(mutation_to_item)
                    .collect::<Vec<MutationItem>>();
                return print_json(&items);
            }
            if mutations.is_empty() {
                println!("No mutations recorded.");
                return Ok(());
            }
            for line in format_mutation_lines(&mutations) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

async fn run_queue_status(as_json: bool, session: &Session) -> Result<(), CliError> {
    let counts = {
        let db = session.sync.database().lock().await;
        SqliteMutationQueue::new(db.connection()).count_by_status(session.ctx.tenant_id())?
    };

    if as_json {
        let by_status = counts
            .iter()
            .map(|(status, count)| (status.as_str(), *count))
            .collect::<BTreeMap<_, _>>();
        return print_json(&by_status);
    }
    for (status, count) in counts {
        println!("{:<16}{count}", status.as_str());
    }
    Ok(())
}
