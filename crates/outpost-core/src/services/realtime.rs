//! Realtime listener: applies remote change events as they arrive.
//!
//! One subscription spans every table. Events are filtered by tenant on this
//! side and applied through the same inbound path as bootstrap. The feed has
//! no resume cursor, so events missed while lagging or disconnected are only
//! recovered by the next bootstrap.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::TenantContext;
use crate::remote::{ChangeFeed, RemoteChange, RemoteStore};
use crate::services::sync::{ApplyOutcome, SyncService};

/// Applies change-feed events for one session tenant
pub struct RealtimeListener<R> {
    sync: SyncService<R>,
    ctx: TenantContext,
}

/// Handle to a running listener task
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop the listener and wait for the task to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Realtime listener task ended abnormally: {error}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<R: RemoteStore> RealtimeListener<R> {
    pub const fn new(sync: SyncService<R>, ctx: TenantContext) -> Self {
        Self { sync, ctx }
    }

    /// Apply one event if it belongs to the session tenant.
    ///
    /// Returns `ForeignTenant` without touching the local store for events of
    /// other tenants and for events that name no tenant.
    pub async fn handle_event(&self, change: &RemoteChange) -> Result<ApplyOutcome> {
        if !change
            .tenant_id()
            .is_some_and(|tenant| self.ctx.owns(tenant))
        {
            return Ok(ApplyOutcome::ForeignTenant);
        }
        self.sync.apply_change(&self.ctx, change).await
    }

    /// Subscribe to the change feed and apply events on a background task
    pub fn start(self) -> Result<ListenerHandle> {
        let feed = self.sync.remote().subscribe()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        tracing::info!(tenant = %self.ctx.tenant_id(), "Realtime listener subscribed");

        let task = tokio::spawn(self.run(feed, shutdown_rx));
        Ok(ListenerHandle { shutdown, task })
    }

    async fn run(self, mut feed: ChangeFeed, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = feed.recv() => match received {
                    Ok(change) => match self.handle_event(&change).await {
                        Ok(ApplyOutcome::ForeignTenant) => {}
                        Ok(outcome) => tracing::debug!(
                            table = %change.table,
                            kind = ?change.kind,
                            ?outcome,
                            "Applied realtime change"
                        ),
                        Err(error) => tracing::warn!(
                            table = %change.table,
                            "Failed to apply realtime change: {error}"
                        ),
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            tenant = %self.ctx.tenant_id(),
                            missed,
                            "Realtime listener lagged; re-run bootstrap to recover missed changes"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Change feed closed, stopping realtime listener");
                        break;
                    }
                },
            }
        }
        tracing::debug!(tenant = %self.ctx.tenant_id(), "Realtime listener stopped");
    }
}
