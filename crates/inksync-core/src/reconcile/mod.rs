//! Per-class reconciliation
//!
//! A [`Reconciler`] decides what happens to one [`SyncRecord`] of the entity
//! classes it is registered for. The coordinator runs each class group on
//! its own task through [`reconcile_group`], which applies the group's
//! records in submission order and reports one [`Resolution`] per record.

mod aggregate;
mod append_only;
mod mutable;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheInvalidator;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{EntityKey, FailureReason, ItemOutcome, Resolution, StoredEntity, SyncRecord};
use crate::store::EntityStore;

pub use aggregate::AggregateReconciler;
pub use append_only::AppendOnlyReconciler;
pub use mutable::MutableRecordReconciler;

/// Everything a reconciler may touch while handling one batch.
#[derive(Clone)]
pub struct ReconcileContext {
    pub store: Arc<dyn EntityStore>,
    pub cache: CacheInvalidator,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
    pub cancel: CancellationToken,
}

impl ReconcileContext {
    /// Fails with [`Error::Cancelled`] once the batch deadline has fired.
    ///
    /// Reconcilers call this before starting an item and again right before
    /// every conditional write.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Read current state, giving up as soon as the batch is cancelled.
    pub async fn read(&self, key: &EntityKey) -> Result<Option<StoredEntity>> {
        self.ensure_active()?;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            stored = self.store.get(key) => stored,
        }
    }
}

/// Strategy for one family of entity classes
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Reconcile one record against stored state.
    ///
    /// Expected conditions (conflicts, bad payloads) are returned as
    /// outcomes; `Err` is reserved for faults and cancellation.
    async fn reconcile(&self, record: &SyncRecord, ctx: &ReconcileContext) -> Result<ItemOutcome>;
}

/// Records of one class, tagged with their position in the batch.
pub struct RecordGroup {
    pub reconciler: Arc<dyn Reconciler>,
    pub records: Vec<(usize, SyncRecord)>,
}

impl RecordGroup {
    pub fn indices(&self) -> Vec<usize> {
        self.records.iter().map(|(index, _)| *index).collect()
    }
}

/// Run a group sequentially, sending each resolution as soon as it is known.
///
/// Stops at the first item that observes cancellation; the coordinator
/// accounts for anything left unresolved.
pub async fn reconcile_group(
    group: RecordGroup,
    ctx: ReconcileContext,
    resolutions: UnboundedSender<Resolution>,
) {
    let RecordGroup {
        reconciler,
        records,
    } = group;

    for (index, record) in records {
        if ctx.ensure_active().is_err() {
            tracing::debug!(
                reconciler = reconciler.name(),
                item = index,
                "Deadline reached; leaving remaining items unresolved"
            );
            return;
        }

        let outcome = match reconciler.reconcile(&record, &ctx).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if !matches!(error, Error::Cancelled) {
                    tracing::warn!(
                        reconciler = reconciler.name(),
                        entity_class = %record.entity_class,
                        retryable = error.is_retryable(),
                        %error,
                        "Item reconciliation failed"
                    );
                }
                ItemOutcome::failed(FailureReason::from(&error))
            }
        };

        tracing::debug!(
            reconciler = reconciler.name(),
            entity_class = %record.entity_class,
            outcome = outcome.label(),
            "Item reconciled"
        );

        if resolutions
            .send(Resolution::new(index, record.id, outcome))
            .is_err()
        {
            return;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{harness, record};
    use super::*;
    use crate::models::EntityClass;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct FailingReconciler;

    #[async_trait]
    impl Reconciler for FailingReconciler {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn reconcile(
            &self,
            record: &SyncRecord,
            _ctx: &ReconcileContext,
        ) -> Result<ItemOutcome> {
            if record.id == "bad" {
                return Err(Error::store("disk unavailable"));
            }
            Ok(ItemOutcome::Accepted)
        }
    }

    fn group(ids: &[&str]) -> RecordGroup {
        RecordGroup {
            reconciler: Arc::new(FailingReconciler),
            records: ids
                .iter()
                .enumerate()
                .map(|(index, id)| {
                    (
                        index * 2,
                        record(EntityClass::Customer, id, json!({"n": index}), 1),
                    )
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn errors_become_failed_items_without_stopping_the_group() {
        let h = harness(1_000);
        let (tx, mut rx) = mpsc::unbounded_channel();

        reconcile_group(group(&["a", "bad", "c"]), h.ctx.clone(), tx).await;

        let mut resolutions = Vec::new();
        while let Some(resolution) = rx.recv().await {
            resolutions.push(resolution);
        }
        assert_eq!(
            resolutions,
            vec![
                Resolution::new(0, "a", ItemOutcome::Accepted),
                Resolution::new(
                    2,
                    "bad",
                    ItemOutcome::failed(FailureReason::PersistenceFailed(
                        "Store error: disk unavailable".to_string()
                    ))
                ),
                Resolution::new(4, "c", ItemOutcome::Accepted),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_group_resolves_nothing() {
        let h = harness(1_000);
        h.ctx.cancel.cancel();
        let (tx, mut rx) = mpsc::unbounded_channel();

        reconcile_group(group(&["a", "b"]), h.ctx.clone(), tx).await;

        assert!(rx.recv().await.is_none());
        assert!(matches!(h.ctx.ensure_active(), Err(Error::Cancelled)));
    }

    struct HangingStore;

    #[async_trait]
    impl EntityStore for HangingStore {
        async fn get(&self, _key: &EntityKey) -> Result<Option<StoredEntity>> {
            std::future::pending().await
        }

        async fn conditional_put(
            &self,
            _key: &EntityKey,
            _write: crate::store::EntityWrite,
            _expected: Option<i64>,
        ) -> Result<crate::store::PutOutcome> {
            std::future::pending().await
        }

        async fn purge_expired(&self, _now: i64) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn read_gives_up_when_cancelled_mid_flight() {
        let mut ctx = harness(1_000).ctx;
        ctx.store = Arc::new(HangingStore);
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = ctx
            .read(&EntityKey::new(EntityClass::Customer, "c1"))
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
