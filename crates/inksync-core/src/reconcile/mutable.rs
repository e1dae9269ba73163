//! Last-writer-wins register for editable records
//!
//! A record is applied when its client timestamp is not older than the
//! stored entity's server stamp; otherwise both states are surfaced as a
//! conflict and the store is left untouched. Resubmitting the payload that
//! is already stored is accepted without a write.

use async_trait::async_trait;

use super::{ReconcileContext, Reconciler};
use crate::clock::next_stamp;
use crate::error::{Error, Result};
use crate::models::{ItemOutcome, SyncRecord};
use crate::store::{EntityWrite, PutOutcome};

/// Reconciler for `appointment`, `customer` and `artist` records.
///
/// A submission whose payload equals the stored payload is accepted before
/// its timestamp is looked at, so a stale replay of already-stored data
/// reports `accepted` rather than `conflict`. Only a differing payload can
/// conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutableRecordReconciler;

#[async_trait]
impl Reconciler for MutableRecordReconciler {
    fn name(&self) -> &'static str {
        "mutable_record"
    }

    async fn reconcile(&self, record: &SyncRecord, ctx: &ReconcileContext) -> Result<ItemOutcome> {
        let key = record.key();
        let attempts = ctx.config.max_put_attempts.max(1);

        for attempt in 1..=attempts {
            let current = ctx.read(&key).await?;

            if let Some(stored) = &current {
                if stored.payload == record.payload {
                    return Ok(ItemOutcome::Accepted);
                }
                if stored.last_modified > record.client_timestamp {
                    return Ok(ItemOutcome::Conflict {
                        server_state: stored.clone(),
                        client_state: record.payload.clone(),
                    });
                }
            }

            let expected = current.as_ref().map(|stored| stored.last_modified);
            let write = EntityWrite::new(
                record.payload.clone(),
                next_stamp(ctx.clock.as_ref(), expected),
            );

            ctx.ensure_active()?;
            match ctx.store.conditional_put(&key, write, expected).await? {
                PutOutcome::Written(_) => {
                    ctx.cache.invalidate(&key.cache_key()).await;
                    return Ok(ItemOutcome::Accepted);
                }
                PutOutcome::Stale => {
                    tracing::debug!(entity_class = %key.class, attempt, "Lost write race; re-reading");
                }
            }
        }

        Err(Error::Contention {
            key: key.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, record, record_from};
    use super::*;
    use crate::models::{EntityClass, EntityKey, StoredEntity};
    use crate::store::EntityStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn first_write_is_stamped_by_the_server() {
        let h = harness(5_000);
        let outcome = MutableRecordReconciler
            .reconcile(
                &record(EntityClass::Appointment, "A1", json!({"slot": "10:00"}), 100),
                &h.ctx,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Accepted);

        let stored = h
            .store
            .get(&EntityKey::new(EntityClass::Appointment, "A1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_modified, 5_000);
    }

    #[tokio::test]
    async fn older_client_state_is_surfaced_as_conflict() {
        let h = harness(5_000);
        let first = json!({"slot": "10:00"});
        let second = json!({"slot": "11:00"});

        MutableRecordReconciler
            .reconcile(&record(EntityClass::Appointment, "A1", first.clone(), 100), &h.ctx)
            .await
            .unwrap();
        h.clock.advance(10);

        let outcome = MutableRecordReconciler
            .reconcile(&record(EntityClass::Appointment, "A1", second.clone(), 90), &h.ctx)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ItemOutcome::Conflict {
                server_state: StoredEntity {
                    id: "A1".to_string(),
                    payload: first.clone(),
                    last_modified: 5_000,
                },
                client_state: second,
            }
        );
        let stored = h
            .store
            .get(&EntityKey::new(EntityClass::Appointment, "A1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload, first);
    }

    #[tokio::test]
    async fn newer_client_state_replaces_and_bumps_stamp() {
        let h = harness(100);
        MutableRecordReconciler
            .reconcile(&record(EntityClass::Customer, "c1", json!({"v": 1}), 50), &h.ctx)
            .await
            .unwrap();

        // Server clock has not moved; the stamp must still increase.
        let outcome = MutableRecordReconciler
            .reconcile(&record(EntityClass::Customer, "c1", json!({"v": 2}), 100), &h.ctx)
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Accepted);

        let stored = h
            .store
            .get(&EntityKey::new(EntityClass::Customer, "c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload, json!({"v": 2}));
        assert_eq!(stored.last_modified, 101);
    }

    #[tokio::test]
    async fn identical_resubmission_is_a_no_op() {
        let h = harness(5_000);
        let item = record(EntityClass::Artist, "r1", json!({"name": "Kai"}), 10);

        MutableRecordReconciler.reconcile(&item, &h.ctx).await.unwrap();
        h.clock.advance(1_000);
        let again = MutableRecordReconciler.reconcile(&item, &h.ctx).await.unwrap();

        assert_eq!(again, ItemOutcome::Accepted);
        let stored = h
            .store
            .get(&EntityKey::new(EntityClass::Artist, "r1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_modified, 5_000);
    }

    #[tokio::test]
    async fn stale_submission_of_stored_payload_is_accepted_not_conflict() {
        let h = harness(5_000);
        MutableRecordReconciler
            .reconcile(
                &record_from("phone", "studio-1", EntityClass::Customer, "c9", json!({"v": 1}), 10),
                &h.ctx,
            )
            .await
            .unwrap();

        let same = MutableRecordReconciler
            .reconcile(
                &record_from("laptop", "studio-1", EntityClass::Customer, "c9", json!({"v": 1}), 1),
                &h.ctx,
            )
            .await
            .unwrap();
        assert_eq!(same, ItemOutcome::Accepted);

        let different = MutableRecordReconciler
            .reconcile(
                &record_from("laptop", "studio-1", EntityClass::Customer, "c9", json!({"v": 2}), 1),
                &h.ctx,
            )
            .await
            .unwrap();
        assert_eq!(different.label(), "conflict");
    }

    #[tokio::test]
    async fn accepted_write_invalidates_cached_entry() {
        let h = harness(5_000);
        h.cache
            .insert("customer:c1", json!({"stale": true}), Duration::from_secs(60))
            .await;

        MutableRecordReconciler
            .reconcile(&record(EntityClass::Customer, "c1", json!({"v": 1}), 10), &h.ctx)
            .await
            .unwrap();

        assert!(h.cache.get("customer:c1").await.is_none());
    }

    #[tokio::test]
    async fn conflict_leaves_cache_alone() {
        let h = harness(5_000);
        MutableRecordReconciler
            .reconcile(&record(EntityClass::Customer, "c1", json!({"v": 1}), 10), &h.ctx)
            .await
            .unwrap();
        h.cache
            .insert("customer:c1", json!({"v": 1}), Duration::from_secs(60))
            .await;

        let outcome = MutableRecordReconciler
            .reconcile(&record(EntityClass::Customer, "c1", json!({"v": 0}), 10), &h.ctx)
            .await
            .unwrap();

        assert_eq!(outcome.label(), "conflict");
        assert!(h.cache.get("customer:c1").await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_devices_yield_one_accept_and_one_conflict() {
        let h = harness(40);
        MutableRecordReconciler
            .reconcile(&record(EntityClass::Appointment, "A1", json!({"seed": true}), 0), &h.ctx)
            .await
            .unwrap();
        h.clock.set(1_000);

        let phone = record_from(
            "phone",
            "studio-1",
            EntityClass::Appointment,
            "A1",
            json!({"slot": "phone"}),
            50,
        );
        let laptop = record_from(
            "laptop",
            "studio-1",
            EntityClass::Appointment,
            "A1",
            json!({"slot": "laptop"}),
            50,
        );

        let ctx = Arc::new(h.ctx.clone());
        let (a, b) = tokio::join!(
            tokio::spawn({
                let ctx = ctx.clone();
                async move { MutableRecordReconciler.reconcile(&phone, &ctx).await }
            }),
            tokio::spawn({
                let ctx = ctx.clone();
                async move { MutableRecordReconciler.reconcile(&laptop, &ctx).await }
            }),
        );
        let mut labels = vec![a.unwrap().unwrap().label(), b.unwrap().unwrap().label()];
        labels.sort_unstable();

        assert_eq!(labels, vec!["accepted", "conflict"]);
    }

    #[tokio::test]
    async fn cancellation_before_commit_writes_nothing() {
        let h = harness(5_000);
        h.ctx.cancel.cancel();

        let result = MutableRecordReconciler
            .reconcile(&record(EntityClass::Customer, "c1", json!({"v": 1}), 10), &h.ctx)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(h.store.is_empty().await);
    }
}
