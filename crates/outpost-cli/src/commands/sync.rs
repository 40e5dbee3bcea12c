use outpost_core::services::{BootstrapReport, PushReport};
use outpost_core::RealtimeListener;

use crate::commands::common::{print_json, Session};
use crate::error::CliError;

pub async fn run_push(as_json: bool, session: &Session) -> Result<(), CliError> {
    let report = session.sync.push_pending(&session.ctx).await?;

    if as_json {
        return print_json(&report);
    }
    if report.is_empty() {
        println!("Nothing to push.");
        return Ok(());
    }
    for line in format_push_report(&report) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_pull(as_json: bool, session: &Session) -> Result<(), CliError> {
    let report = session.sync.pull_all_data(&session.ctx).await?;

    if as_json {
        return print_json(&report);
    }
    for line in format_bootstrap_report(&report) {
        println!("{line}");
    }
    Ok(())
}

/// Bootstrap, then apply realtime changes and sweep the queue until Ctrl-C
pub async fn run_listen(session: &Session) -> Result<(), CliError> {
    let report = session.sync.pull_all_data(&session.ctx).await?;
    println!("Bootstrapped {} records", report.total_applied());

    let listener = RealtimeListener::new(session.sync.clone(), session.ctx.clone()).start()?;
    let sweep = session.sync.spawn_retry_sweep(session.ctx.clone());
    println!(
        "Listening for changes to tenant {} (Ctrl-C to stop)",
        session.ctx.tenant_id()
    );

    let interrupted = tokio::signal::ctrl_c().await;
    sweep.abort();
    listener.stop().await;
    interrupted?;

    println!("Stopped");
    Ok(())
}

pub fn format_push_report(report: &PushReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Processed {} mutations ({} written)",
        report.processed,
        report.upserted()
    )];
    for (label, count) in [
        ("discarded as stale", report.discarded_stale),
        ("rejected as conflicts", report.conflicts),
        ("left for retry", report.retried),
        ("quarantined", report.quarantined),
        ("skipped (unknown type)", report.skipped),
    ] {
        if count > 0 {
            lines.push(format!("  {count} {label}"));
        }
    }
    lines
}

pub fn format_bootstrap_report(report: &BootstrapReport) -> Vec<String> {
    report
        .tables
        .iter()
        .map(|table| match &table.error {
            Some(error) => format!("{:<15} failed: {error}", table.kind.remote_table()),
            None => format!(
                "{:<15} fetched={} applied={} kept_local={} skipped={}",
                table.kind.remote_table(),
                table.fetched,
                table.applied,
                table.kept_local,
                table.skipped
            ),
        })
        .collect()
}
