//! Field-merging reconciler for analytics facts
//!
//! Facts never conflict. Each one is folded into the aggregate for its
//! `(factType, ownerId)` pair with per-field last-writer-wins, the result is
//! written back with a conditional put, and the cached copy is refreshed.

use async_trait::async_trait;
use serde_json::Value;

use super::{ReconcileContext, Reconciler};
use crate::cache::MergeFn;
use crate::clock::next_stamp;
use crate::error::{Error, Result};
use crate::models::{fact_type_of, AggregateState, EntityClass, EntityKey, ItemOutcome, SyncRecord};
use crate::store::{EntityWrite, PutOutcome};

/// Reconciler for `analyticsFact` records
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateReconciler;

#[async_trait]
impl Reconciler for AggregateReconciler {
    fn name(&self) -> &'static str {
        "mergeable_aggregate"
    }

    async fn reconcile(&self, record: &SyncRecord, ctx: &ReconcileContext) -> Result<ItemOutcome> {
        let (fact_type, fields) = fact_type_of(&record.payload)?;
        let key = EntityKey::new(
            EntityClass::AnalyticsFact,
            AggregateState::storage_id(fact_type, record.owner_id()),
        );
        let attempts = ctx.config.max_put_attempts.max(1);

        for attempt in 1..=attempts {
            let current = ctx.read(&key).await?;

            let mut state = match &current {
                Some(stored) => {
                    AggregateState::load_for(&stored.payload, fact_type, record.owner_id())?
                }
                None => AggregateState::new(fact_type, record.owner_id()),
            };
            let changed = state.merge_fields(fields, record.client_timestamp);
            if !changed && current.is_some() {
                return Ok(ItemOutcome::Accepted);
            }

            let expected = current.as_ref().map(|stored| stored.last_modified);
            let write = EntityWrite::new(state.to_payload()?, next_stamp(ctx.clock.as_ref(), expected));

            ctx.ensure_active()?;
            match ctx.store.conditional_put(&key, write, expected).await? {
                PutOutcome::Written(_) => {
                    ctx.cache
                        .refresh(
                            &key.cache_key(),
                            ctx.config.aggregate_cache_ttl,
                            merge_into_cached(state),
                        )
                        .await;
                    return Ok(ItemOutcome::Accepted);
                }
                PutOutcome::Stale => {
                    tracing::debug!(fact_type, attempt, "Aggregate changed underneath merge; retrying");
                }
            }
        }

        Err(Error::Contention {
            key: key.to_string(),
            attempts,
        })
    }
}

/// Fold freshly written state into whatever the cache currently holds.
fn merge_into_cached(fresh: AggregateState) -> MergeFn {
    Box::new(move |cached: Option<Value>| {
        let mut merged = cached
            .and_then(|value| AggregateState::from_payload(&value).ok())
            .filter(|state| state.fact_type == fresh.fact_type && state.owner_id == fresh.owner_id)
            .unwrap_or_else(|| AggregateState::new(fresh.fact_type.clone(), fresh.owner_id.clone()));
        merged.merge(&fresh);
        merged.to_payload().unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{harness, record, record_from, Harness};
    use super::*;
    use crate::models::{FailureReason, FieldEntry};
    use crate::store::EntityStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn aggregate_key(fact_type: &str, owner_id: &str) -> EntityKey {
        EntityKey::new(
            EntityClass::AnalyticsFact,
            AggregateState::storage_id(fact_type, owner_id),
        )
    }

    async fn stored_state(h: &Harness, fact_type: &str) -> AggregateState {
        let stored = h
            .store
            .get(&aggregate_key(fact_type, "studio-1"))
            .await
            .unwrap()
            .unwrap();
        AggregateState::from_payload(&stored.payload).unwrap()
    }

    #[tokio::test]
    async fn facts_merge_per_field_by_client_timestamp() {
        let h = harness(1_000);
        let reconciler = AggregateReconciler;

        reconciler
            .reconcile(
                &record(
                    EntityClass::AnalyticsFact,
                    "f1",
                    json!({"factType": "bookings", "total": 3, "noShows": 1}),
                    200,
                ),
                &h.ctx,
            )
            .await
            .unwrap();
        let outcome = reconciler
            .reconcile(
                &record(
                    EntityClass::AnalyticsFact,
                    "f2",
                    json!({"factType": "bookings", "total": 2, "walkIns": 4}),
                    100,
                ),
                &h.ctx,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ItemOutcome::Accepted);

        let state = stored_state(&h, "bookings").await;
        assert_eq!(
            state.fields.get("total"),
            Some(&FieldEntry {
                value: json!(3),
                client_timestamp: 200,
            })
        );
        assert_eq!(state.fields.get("walkIns").map(|entry| &entry.value), Some(&json!(4)));
        assert_eq!(state.fields.get("noShows").map(|entry| &entry.value), Some(&json!(1)));
        assert!(!state.fields.contains_key("factType"));
    }

    #[tokio::test]
    async fn arrival_order_does_not_change_result() {
        let facts = [
            (json!({"factType": "revenue", "day": 10, "week": 70}), 5),
            (json!({"factType": "revenue", "day": 12}), 9),
            (json!({"factType": "revenue", "week": 65}), 9),
        ];

        let forward = harness(1_000);
        for (n, (payload, ts)) in facts.iter().enumerate() {
            AggregateReconciler
                .reconcile(
                    &record(EntityClass::AnalyticsFact, &format!("f{n}"), payload.clone(), *ts),
                    &forward.ctx,
                )
                .await
                .unwrap();
        }

        let backward = harness(1_000);
        for (n, (payload, ts)) in facts.iter().enumerate().rev() {
            AggregateReconciler
                .reconcile(
                    &record(EntityClass::AnalyticsFact, &format!("f{n}"), payload.clone(), *ts),
                    &backward.ctx,
                )
                .await
                .unwrap();
        }

        assert_eq!(
            stored_state(&forward, "revenue").await.fields,
            stored_state(&backward, "revenue").await.fields
        );
    }

    #[tokio::test]
    async fn owners_get_separate_aggregates() {
        let h = harness(1_000);
        for owner in ["studio-1", "studio-2"] {
            AggregateReconciler
                .reconcile(
                    &record_from(
                        "tablet",
                        owner,
                        EntityClass::AnalyticsFact,
                        "f1",
                        json!({"factType": "bookings", "owner": owner}),
                        1,
                    ),
                    &h.ctx,
                )
                .await
                .unwrap();
        }
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn colon_in_fact_type_or_owner_cannot_reach_another_aggregate() {
        let h = harness(1_000);
        AggregateReconciler
            .reconcile(
                &record_from(
                    "tablet",
                    "b:c",
                    EntityClass::AnalyticsFact,
                    "f1",
                    json!({"factType": "a", "secret": 1}),
                    1,
                ),
                &h.ctx,
            )
            .await
            .unwrap();
        AggregateReconciler
            .reconcile(
                &record_from(
                    "phone",
                    "c",
                    EntityClass::AnalyticsFact,
                    "f2",
                    json!({"factType": "a:b", "secret": 99}),
                    2,
                ),
                &h.ctx,
            )
            .await
            .unwrap();

        assert_eq!(h.store.len().await, 2);
        let stored = h.store.get(&aggregate_key("a", "b:c")).await.unwrap().unwrap();
        let state = AggregateState::from_payload(&stored.payload).unwrap();
        assert_eq!(state.owner_id, "b:c");
        assert_eq!(state.fields["secret"].value, json!(1));
    }

    #[tokio::test]
    async fn missing_fact_type_is_invalid_payload() {
        let h = harness(1_000);
        let error = AggregateReconciler
            .reconcile(
                &record(EntityClass::AnalyticsFact, "f1", json!({"total": 1}), 1),
                &h.ctx,
            )
            .await
            .unwrap_err();

        assert_eq!(FailureReason::from(&error).code(), "invalid_payload");
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn successful_merge_refreshes_cache() {
        let h = harness(1_000);
        h.cache
            .insert(
                &aggregate_key("bookings", "studio-1").cache_key(),
                json!({
                    "factType": "bookings",
                    "ownerId": "studio-1",
                    "fields": {"cachedOnly": {"value": 1, "clientTimestamp": 1}}
                }),
                std::time::Duration::from_secs(60),
            )
            .await;

        AggregateReconciler
            .reconcile(
                &record(
                    EntityClass::AnalyticsFact,
                    "f1",
                    json!({"factType": "bookings", "total": 7}),
                    3,
                ),
                &h.ctx,
            )
            .await
            .unwrap();

        let cached = h
            .cache
            .get(&aggregate_key("bookings", "studio-1").cache_key())
            .await
            .unwrap();
        let cached = AggregateState::from_payload(&cached).unwrap();
        assert!(cached.fields.contains_key("cachedOnly"));
        assert_eq!(cached.fields.get("total").map(|entry| &entry.value), Some(&json!(7)));
    }
}
