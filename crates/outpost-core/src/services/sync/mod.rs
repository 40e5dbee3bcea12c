//! Synchronization between the local store and the remote store.
//!
//! [`SyncService`] owns the three paths that move data:
//!
//! - push (`push.rs`): drains the mutation queue under last-write-wins,
//! - bootstrap (`bootstrap.rs`): full-snapshot pull at session start,
//! - inbound apply (`inbound.rs`): the single remote -> local write path,
//!   shared by bootstrap and the realtime listener.
//!
//! Every call takes the session's [`TenantContext`] explicitly. The local
//! database sits behind one async mutex; it is never held across a remote
//! call.

mod bootstrap;
mod inbound;
mod push;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::db::{Database, EntityStore, MutationQueue, SqliteEntityStore, SqliteMutationQueue};
use crate::error::Result;
use crate::mapping::{bind_tenant, FieldMapper, LocalDocument};
use crate::models::{Mutation, MutationOperation, TenantContext};
use crate::remote::RemoteStore;

pub use bootstrap::{BootstrapReport, TableReport};
pub use inbound::ApplyOutcome;
pub use push::PushReport;

/// Sync engine over one local database and one remote store
pub struct SyncService<R> {
    db: Arc<Mutex<Database>>,
    remote: Arc<R>,
    config: SyncConfig,
}

impl<R> Clone for SyncService<R> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            remote: Arc::clone(&self.remote),
            config: self.config.clone(),
        }
    }
}

impl<R: RemoteStore> SyncService<R> {
    pub fn new(db: Database, remote: Arc<R>, config: SyncConfig) -> Self {
        Self::from_shared(Arc::new(Mutex::new(db)), remote, config)
    }

    /// Build a service over a database other components already share
    pub const fn from_shared(db: Arc<Mutex<Database>>, remote: Arc<R>, config: SyncConfig) -> Self {
        Self { db, remote, config }
    }

    pub const fn database(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }

    pub const fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run `f` against the locked database
    pub(crate) async fn with_db<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().await;
        f(&mut db)
    }

    /// Persist a local write and record it for push.
    ///
    /// The document and its mutation are written in one transaction, so a
    /// failed write enqueues nothing. The caller owns the entity's
    /// `updated_at`; a `Delete` turns the entity into a tombstone first. When
    /// `push_on_save` is enabled a push follows, and its failure is only
    /// logged: the mutation stays queued for the next cycle.
    pub async fn save<E: FieldMapper>(
        &self,
        ctx: &TenantContext,
        operation: MutationOperation,
        mut entity: E,
    ) -> Result<Mutation> {
        bind_tenant(&mut entity, ctx)?;
        if operation == MutationOperation::Delete {
            entity.set_deleted();
        }
        let document = LocalDocument::from_entity(&entity, ctx)?;

        let mutation = self
            .with_db(|db| {
                let tx = db.connection_mut().transaction()?;
                SqliteEntityStore::new(&tx).upsert(&document)?;
                let mutation = SqliteMutationQueue::new(&tx).enqueue(
                    ctx.tenant_id(),
                    E::KIND,
                    operation,
                    &document.document,
                )?;
                tx.commit()?;
                Ok(mutation)
            })
            .await?;

        tracing::debug!(
            tenant = %ctx.tenant_id(),
            entity_type = %E::KIND,
            entity_id = %mutation.entity_id,
            operation = %operation,
            "Saved local write"
        );

        if self.config.push_on_save {
            if let Err(error) = self.push_pending(ctx).await {
                tracing::warn!("Push after save failed, will retry later: {error}");
            }
        }

        Ok(mutation)
    }

    /// Push up to `batch_size` pending mutations of the session tenant
    pub async fn push_pending(&self, ctx: &TenantContext) -> Result<PushReport> {
        let batch_size = self.config.batch_size;
        let batch = self
            .with_db(|db| {
                SqliteMutationQueue::new(db.connection()).get_pending(ctx.tenant_id(), batch_size)
            })
            .await?;
        self.process_mutations(ctx, batch).await
    }

    /// Periodically push pending mutations until the returned task is aborted
    pub fn spawn_retry_sweep(&self, ctx: TenantContext) -> JoinHandle<()> {
        let service = self.clone();
        let period = self.config.retry_sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.push_pending(&ctx).await {
                    Ok(report) if report.is_empty() => {}
                    Ok(report) => tracing::info!(
                        tenant = %ctx.tenant_id(),
                        processed = report.processed,
                        retried = report.retried,
                        conflicts = report.conflicts,
                        "Retry sweep pushed pending mutations"
                    ),
                    Err(error) => tracing::warn!("Retry sweep failed: {error}"),
                }
            }
        })
    }
}
