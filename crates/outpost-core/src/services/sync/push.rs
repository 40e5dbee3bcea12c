//! Push path: drain the mutation queue into the remote store.

use std::collections::HashMap;

use serde::Serialize;

use super::SyncService;
use crate::db::{
    ConflictRepository, MutationQueue, SqliteConflictRepository, SqliteMutationQueue,
};
use crate::error::Result;
use crate::mapping::prepare_write;
use crate::models::{EntityKind, Mutation, TenantContext};
use crate::remote::{RemoteError, RemoteStore};

/// Counters for one push run.
///
/// `processed` counts mutations that reached a settled remote outcome:
/// upserted, or discarded because the remote row was newer. Discards are also
/// counted in `discarded_stale`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub processed: usize,
    pub conflicts: usize,
    pub discarded_stale: usize,
    pub retried: usize,
    pub skipped: usize,
    pub quarantined: usize,
}

impl PushReport {
    /// Mutations whose snapshot was written to the remote store
    pub const fn upserted(&self) -> usize {
        self.processed - self.discarded_stale
    }

    pub const fn is_empty(&self) -> bool {
        self.processed == 0
            && self.conflicts == 0
            && self.retried == 0
            && self.skipped == 0
            && self.quarantined == 0
    }

    fn record(&mut self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Synced => self.processed += 1,
            PushOutcome::DiscardedStale => {
                self.processed += 1;
                self.discarded_stale += 1;
            }
            PushOutcome::Conflict => self.conflicts += 1,
            PushOutcome::Retried => self.retried += 1,
            PushOutcome::Quarantined => self.quarantined += 1,
            PushOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    Synced,
    DiscardedStale,
    Conflict,
    Retried,
    Quarantined,
    Skipped,
}

/// Last `updated_at` written per entity during one batch
type AppliedClocks = HashMap<(EntityKind, String), i64>;

impl<R: RemoteStore> SyncService<R> {
    /// Push a batch of mutations under last-write-wins.
    ///
    /// Mutations run one at a time in ascending timestamp order. The LWW clock
    /// is the snapshot's own `updatedAt`, compared with the remote row or with
    /// the value this batch last wrote for the same entity. Local database
    /// errors abort the run; remote errors only affect their mutation.
    pub async fn process_mutations(
        &self,
        ctx: &TenantContext,
        mut batch: Vec<Mutation>,
    ) -> Result<PushReport> {
        batch.sort_by_key(|mutation| mutation.timestamp);

        let mut report = PushReport::default();
        let mut applied = AppliedClocks::new();
        for mutation in &batch {
            let outcome = self.push_mutation(ctx, mutation, &mut applied).await?;
            report.record(outcome);
        }

        if !report.is_empty() {
            tracing::info!(
                tenant = %ctx.tenant_id(),
                processed = report.processed,
                discarded_stale = report.discarded_stale,
                conflicts = report.conflicts,
                retried = report.retried,
                skipped = report.skipped,
                quarantined = report.quarantined,
                "Push finished"
            );
        }
        Ok(report)
    }

    async fn push_mutation(
        &self,
        ctx: &TenantContext,
        mutation: &Mutation,
        applied: &mut AppliedClocks,
    ) -> Result<PushOutcome> {
        let Ok(kind) = mutation.entity_type.parse::<EntityKind>() else {
            self.with_db(|db| SqliteMutationQueue::new(db.connection()).mark_skipped(&mutation.id))
                .await?;
            tracing::warn!(
                mutation_id = %mutation.id,
                entity_type = %mutation.entity_type,
                "Skipping mutation of unregistered entity type"
            );
            return Ok(PushOutcome::Skipped);
        };

        if !ctx.owns(&mutation.tenant_id) {
            let reason = format!(
                "mutation belongs to tenant {}, session tenant is {}",
                mutation.tenant_id,
                ctx.tenant_id()
            );
            return self.reject(mutation, &reason).await;
        }

        let prepared = match prepare_write(kind, &mutation.payload, ctx) {
            Ok(prepared) => prepared,
            Err(error) => return self.reject(mutation, &error.to_string()).await,
        };
        if prepared.entity_id != mutation.entity_id {
            let reason = format!(
                "payload id {} does not match entity id {}",
                prepared.entity_id, mutation.entity_id
            );
            return self.reject(mutation, &reason).await;
        }

        let table = kind.remote_table();
        let key = (kind, prepared.entity_id.clone());
        let remote_updated_at = match applied.get(&key) {
            Some(updated_at) => Some(*updated_at),
            None => match self
                .remote
                .fetch_updated_at(table, ctx.tenant_id().as_str(), &prepared.entity_id)
                .await
            {
                Ok(updated_at) => updated_at,
                Err(error) => return self.remote_failure(mutation, &error).await,
            },
        };

        if remote_updated_at.is_some_and(|remote| remote > prepared.updated_at) {
            self.with_db(|db| {
                SqliteMutationQueue::new(db.connection()).mark_discarded_stale(&mutation.id)
            })
            .await?;
            tracing::debug!(
                mutation_id = %mutation.id,
                entity_type = %kind,
                entity_id = %prepared.entity_id,
                local = prepared.updated_at,
                remote = remote_updated_at,
                "Discarded stale mutation"
            );
            return Ok(PushOutcome::DiscardedStale);
        }

        let updated_at = prepared.updated_at;
        match self.remote.upsert(table, prepared.row).await {
            Ok(()) => {
                self.with_db(|db| {
                    SqliteMutationQueue::new(db.connection()).mark_synced(&mutation.id)
                })
                .await?;
                applied.insert(key, updated_at);
                tracing::debug!(
                    mutation_id = %mutation.id,
                    entity_type = %kind,
                    entity_id = %mutation.entity_id,
                    "Pushed mutation"
                );
                Ok(PushOutcome::Synced)
            }
            Err(error) => self.remote_failure(mutation, &error).await,
        }
    }

    /// Transient errors keep the mutation pending; anything else is a conflict
    async fn remote_failure(&self, mutation: &Mutation, error: &RemoteError) -> Result<PushOutcome> {
        if !error.is_transient() {
            return self.reject(mutation, &error.to_string()).await;
        }

        let message = error.to_string();
        let exhausted = self
            .with_db(|db| {
                let queue = SqliteMutationQueue::new(db.connection());
                let retry_count = queue.increment_retry(&mutation.id, &message)?;
                let exhausted = self.config.retries_exhausted(retry_count);
                if exhausted {
                    queue.mark_quarantined(&mutation.id)?;
                }
                Ok(exhausted)
            })
            .await?;

        if exhausted {
            tracing::warn!(
                mutation_id = %mutation.id,
                entity_type = %mutation.entity_type,
                entity_id = %mutation.entity_id,
                "Quarantined mutation after repeated failures: {message}"
            );
            Ok(PushOutcome::Quarantined)
        } else {
            tracing::debug!(
                mutation_id = %mutation.id,
                "Push failed transiently, keeping mutation pending: {message}"
            );
            Ok(PushOutcome::Retried)
        }
    }

    /// Record a data-level failure; the mutation is never retried automatically
    async fn reject(&self, mutation: &Mutation, reason: &str) -> Result<PushOutcome> {
        self.with_db(|db| {
            let tx = db.connection_mut().transaction()?;
            SqliteConflictRepository::new(&tx).record(mutation, reason)?;
            SqliteMutationQueue::new(&tx).mark_conflict(&mutation.id)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        Ok(PushOutcome::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, manual, service};
    use super::*;
    use crate::mapping::{format_timestamp, FieldMapper};
    use crate::models::{MutationId, MutationOperation, MutationStatus, TenantId, Vehicle};
    use crate::remote::InMemoryRemoteStore;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const T1: i64 = 1_700_000_001_000;
    const T2: i64 = 1_700_000_002_000;
    const T5: i64 = 1_700_000_005_000;

    fn vehicle(id: &str, plate: &str, updated_at: i64) -> Vehicle {
        let mut vehicle = Vehicle::new(plate, "Seat", "Ibiza");
        vehicle.id = id.to_string();
        vehicle.created_at = T1;
        vehicle.updated_at = updated_at;
        vehicle
    }

    async fn enqueue_at(
        sync: &SyncService<InMemoryRemoteStore>,
        tenant: &str,
        payload: impl Serialize,
        operation: MutationOperation,
        timestamp: i64,
    ) -> Mutation {
        let tenant = TenantId::new(tenant).unwrap();
        let payload = serde_json::to_value(payload).unwrap();
        sync.with_db(|db| {
            SqliteMutationQueue::new(db.connection()).enqueue_at(
                &tenant,
                EntityKind::Vehicle,
                operation,
                &payload,
                timestamp,
            )
        })
        .await
        .unwrap()
    }

    async fn status(sync: &SyncService<InMemoryRemoteStore>, id: &MutationId) -> Mutation {
        sync.with_db(|db| SqliteMutationQueue::new(db.connection()).get(id))
            .await
            .unwrap()
            .unwrap()
    }

    fn plate(remote: &InMemoryRemoteStore, id: &str) -> Option<Value> {
        remote
            .row("vehicles", id)
            .and_then(|row| row.get("license_plate").cloned())
    }

    #[tokio::test]
    async fn create_reaches_remote() {
        let (sync, remote) = service(manual());
        let v1 = vehicle("V1", "AB-1", T1);
        let mutation = enqueue_at(&sync, "g1", &v1, MutationOperation::Create, T1).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(
            report,
            PushReport {
                processed: 1,
                ..PushReport::default()
            }
        );
        assert_eq!(plate(&remote, "V1"), Some(json!("AB-1")));
        assert_eq!(status(&sync, &mutation.id).await.status, MutationStatus::Synced);
    }

    #[tokio::test]
    async fn stale_update_is_discarded() {
        let (sync, remote) = service(manual());
        let mut newer = vehicle("V1", "REMOTE", T5).to_remote();
        newer.insert("tenant_id".into(), json!("g1"));
        remote.seed("vehicles", newer.clone());

        let stale = vehicle("V1", "LOCAL", T1);
        let mutation = enqueue_at(&sync, "g1", &stale, MutationOperation::Update, T2).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(report.discarded_stale, 1);
        assert_eq!(report.upserted(), 0);
        assert_eq!(remote.row("vehicles", "V1"), Some(newer));
        let stored = status(&sync, &mutation.id).await;
        assert_eq!(stored.status, MutationStatus::DiscardedStale);
        assert!(stored.synced);
    }

    #[tokio::test]
    async fn newer_update_overwrites_remote() {
        let (sync, remote) = service(manual());
        let mut older = vehicle("V1", "REMOTE", T1).to_remote();
        older.insert("tenant_id".into(), json!("g1"));
        remote.seed("vehicles", older);

        let newer = vehicle("V1", "LOCAL", T5);
        enqueue_at(&sync, "g1", &newer, MutationOperation::Update, T5).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.upserted(), 1);
        assert_eq!(plate(&remote, "V1"), Some(json!("LOCAL")));
        assert_eq!(
            remote.row("vehicles", "V1").unwrap()["updated_at"],
            json!(format_timestamp(T5))
        );
    }

    #[tokio::test]
    async fn pushing_the_same_mutation_twice_is_idempotent() {
        let (sync, remote) = service(manual());
        let v1 = vehicle("V1", "AB-1", T1);
        let mutation = enqueue_at(&sync, "g1", &v1, MutationOperation::Create, T1).await;

        sync.process_mutations(&ctx("g1"), vec![mutation.clone()])
            .await
            .unwrap();
        let once = remote.rows("vehicles");
        let report = sync
            .process_mutations(&ctx("g1"), vec![mutation])
            .await
            .unwrap();

        assert_eq!(report.conflicts, 0);
        assert_eq!(remote.rows("vehicles"), once);
    }

    #[tokio::test]
    async fn same_entity_batch_keeps_latest_snapshot() {
        let (sync, remote) = service(manual());
        let first = vehicle("V1", "FIRST", T1);
        let second = vehicle("V1", "SECOND", T2);
        // Same enqueue time, so the batch order is only the insertion order
        // and the newer snapshot is handed over first.
        enqueue_at(&sync, "g1", &second, MutationOperation::Update, T2).await;
        let older = enqueue_at(&sync, "g1", &first, MutationOperation::Update, T2).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.discarded_stale, 1);
        assert_eq!(plate(&remote, "V1"), Some(json!("SECOND")));
        assert_eq!(status(&sync, &older.id).await.status, MutationStatus::DiscardedStale);
    }

    #[tokio::test]
    async fn ordered_batch_ends_at_latest_snapshot() {
        let (sync, remote) = service(manual());
        let first = vehicle("V1", "FIRST", T1);
        let second = vehicle("V1", "SECOND", T2);
        enqueue_at(&sync, "g1", &first, MutationOperation::Create, T1).await;
        enqueue_at(&sync, "g1", &second, MutationOperation::Update, T2).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.upserted(), 2);
        assert_eq!(plate(&remote, "V1"), Some(json!("SECOND")));
    }

    #[tokio::test]
    async fn payload_without_tenant_is_stamped() {
        let (sync, remote) = service(manual());
        let payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        assert!(payload.get("tenantId").is_none());
        enqueue_at(&sync, "g1", payload, MutationOperation::Create, T1).await;

        sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(remote.row("vehicles", "V1").unwrap()["tenant_id"], json!("g1"));
    }

    #[tokio::test]
    async fn payload_of_another_tenant_is_rejected_locally() {
        let (sync, remote) = service(manual());
        let mut payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        payload["tenantId"] = json!("intruder");
        let mutation = enqueue_at(&sync, "g1", payload, MutationOperation::Create, T1).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(remote.upsert_count(), 0);
        assert_eq!(status(&sync, &mutation.id).await.status, MutationStatus::Conflict);
    }

    #[tokio::test]
    async fn out_of_range_clock_is_a_conflict() {
        let (sync, remote) = service(manual());
        let broken = vehicle("V1", "AB-1", i64::MAX);
        let mutation = enqueue_at(&sync, "g1", &broken, MutationOperation::Update, T1).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(remote.upsert_count(), 0);
        assert_eq!(status(&sync, &mutation.id).await.status, MutationStatus::Conflict);
    }

    #[tokio::test]
    async fn mutation_queued_by_another_session_is_rejected() {
        let (sync, remote) = service(manual());
        let payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        let mutation = enqueue_at(&sync, "g2", payload, MutationOperation::Create, T1).await;

        let report = sync
            .process_mutations(&ctx("g1"), vec![mutation])
            .await
            .unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(remote.upsert_count(), 0);
    }

    #[tokio::test]
    async fn rejected_row_creates_exactly_one_conflict() {
        let (sync, remote) = service(manual());
        remote.reject_id("V1", "plate must be unique");
        let payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        let mutation = enqueue_at(&sync, "g1", payload, MutationOperation::Create, T1).await;

        let first = sync.push_pending(&ctx("g1")).await.unwrap();
        let second = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(first.conflicts, 1);
        assert!(second.is_empty());
        let conflicts = sync
            .with_db(|db| SqliteConflictRepository::new(db.connection()).list(10, false))
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].mutation_id, mutation.id.to_string());
        assert!(conflicts[0].error.contains("plate must be unique"));
        assert_eq!(conflicts[0].received_payload, mutation.payload);
        assert_eq!(status(&sync, &mutation.id).await.retry_count, 0);
    }

    #[tokio::test]
    async fn transient_failure_keeps_mutation_pending() {
        let (sync, remote) = service(manual());
        remote.fail_next_upserts(1);
        let payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        let mutation = enqueue_at(&sync, "g1", payload, MutationOperation::Create, T1).await;

        let first = sync.push_pending(&ctx("g1")).await.unwrap();
        assert_eq!(first.retried, 1);
        assert_eq!(first.conflicts, 0);
        let pending = status(&sync, &mutation.id).await;
        assert_eq!(pending.status, MutationStatus::Pending);
        assert_eq!(pending.retry_count, 1);
        assert_eq!(
            pending.last_error.as_deref(),
            Some("Remote store unavailable: connection reset")
        );

        let second = sync.push_pending(&ctx("g1")).await.unwrap();
        assert_eq!(second.processed, 1);
        assert!(status(&sync, &mutation.id).await.synced);
    }

    #[tokio::test]
    async fn retry_cap_quarantines_mutation() {
        let (sync, remote) = service(manual().with_max_retries(2));
        remote.set_offline(true);
        let payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        let mutation = enqueue_at(&sync, "g1", payload, MutationOperation::Create, T1).await;

        assert_eq!(sync.push_pending(&ctx("g1")).await.unwrap().retried, 1);
        assert_eq!(sync.push_pending(&ctx("g1")).await.unwrap().quarantined, 1);

        remote.set_offline(false);
        assert!(sync.push_pending(&ctx("g1")).await.unwrap().is_empty());
        assert_eq!(status(&sync, &mutation.id).await.status, MutationStatus::Quarantined);
    }

    async fn enqueue_unregistered(
        sync: &SyncService<InMemoryRemoteStore>,
        timestamp: i64,
    ) -> MutationId {
        let id = MutationId::new();
        sync.with_db(|db| {
            db.connection().execute(
                "INSERT INTO mutations (id, tenant_id, entity_type, entity_id, operation, payload, timestamp)
                 VALUES (?, 'g1', 'invoice', 'i1', 'CREATE', '{\"id\":\"i1\"}', ?)",
                rusqlite::params![id.as_str(), timestamp],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn unregistered_entity_types_are_skipped() {
        let (sync, remote) = service(manual());
        let id = enqueue_unregistered(&sync, 1).await;

        let report = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(report.retried, 0);
        assert_eq!(remote.upsert_count(), 0);
        let stored = status(&sync, &id).await;
        assert_eq!(stored.status, MutationStatus::Skipped);
        assert!(!stored.synced);

        assert!(sync.push_pending(&ctx("g1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skipped_mutations_do_not_block_the_queue() {
        let (sync, remote) = service(manual().with_batch_size(1));
        enqueue_unregistered(&sync, 1).await;
        let v1 = vehicle("V1", "AB-1", T1);
        let mutation = enqueue_at(&sync, "g1", &v1, MutationOperation::Create, T1).await;

        let first = sync.push_pending(&ctx("g1")).await.unwrap();
        let second = sync.push_pending(&ctx("g1")).await.unwrap();

        assert_eq!(first.skipped, 1);
        assert_eq!(second.processed, 1);
        assert_eq!(plate(&remote, "V1"), Some(json!("AB-1")));
        assert_eq!(status(&sync, &mutation.id).await.status, MutationStatus::Synced);
    }

    #[tokio::test]
    async fn push_pending_only_drains_session_tenant() {
        let (sync, remote) = service(manual());
        let payload = serde_json::to_value(vehicle("V1", "AB-1", T1)).unwrap();
        enqueue_at(&sync, "g2", payload, MutationOperation::Create, T1).await;

        assert!(sync.push_pending(&ctx("g1")).await.unwrap().is_empty());
        assert_eq!(remote.upsert_count(), 0);
    }
}
