//! Batch coordinator
//!
//! [`SyncEngine`] validates an envelope, routes its items to per-class
//! groups, runs every group on its own task under one deadline, and
//! assembles a [`BatchResult`] in which every submitted item appears
//! exactly once.
//!
//! When the deadline passes the coordinator cancels the groups and then
//! waits for them to stop, so a write is either reported or never applied.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{Cache, CacheInvalidator};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{BatchResult, FailureReason, ItemOutcome, Resolution};
use crate::reconcile::{reconcile_group, ReconcileContext};
use crate::registry::ReconcilerRegistry;
use crate::store::EntityStore;
use crate::util::fingerprint;
use crate::wire::{BatchEnvelope, BatchRequest, BatchResponse};

/// Entry point for batch reconciliation
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn EntityStore>,
    cache: CacheInvalidator,
    clock: Arc<dyn Clock>,
    registry: Arc<ReconcilerRegistry>,
    config: Arc<EngineConfig>,
}

impl SyncEngine {
    /// Engine with the built-in reconcilers and the system clock.
    pub fn new(store: Arc<dyn EntityStore>, cache: Arc<dyn Cache>, config: EngineConfig) -> Self {
        Self {
            store,
            cache: CacheInvalidator::new(cache),
            clock: Arc::new(SystemClock::new()),
            registry: Arc::new(ReconcilerRegistry::with_defaults()),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ReconcilerRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Validate and reconcile a wire request.
    ///
    /// Fails only when the envelope is malformed; item-level problems are
    /// reported inside the response.
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchResponse> {
        let envelope = request.into_envelope(self.config.max_batch_items)?;
        let result = self.process(envelope).await;
        Ok(BatchResponse::new(result, self.clock.now_millis()))
    }

    /// Reconcile a validated envelope.
    pub async fn process(&self, envelope: BatchEnvelope) -> BatchResult {
        let batch_id = Uuid::now_v7();
        let started = Instant::now();
        let deadline = started + self.config.batch_deadline;
        let BatchEnvelope { provenance, items } = envelope;

        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; ids.len()];

        let routed = self.registry.route(items, &provenance);
        for resolution in routed.resolved {
            outcomes[resolution.index] = Some(resolution.outcome);
        }

        tracing::debug!(
            %batch_id,
            device = fingerprint(&provenance.device_id),
            owner = fingerprint(&provenance.owner_id),
            items = ids.len(),
            groups = routed.groups.len(),
            "Reconciling batch"
        );

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<Resolution>();
        let mut tasks = JoinSet::new();
        let mut group_items: HashMap<tokio::task::Id, Vec<usize>> = HashMap::new();

        for group in routed.groups {
            let indices = group.indices();
            let ctx = ReconcileContext {
                store: self.store.clone(),
                cache: self.cache.clone(),
                clock: self.clock.clone(),
                config: self.config.clone(),
                cancel: cancel.child_token(),
            };
            let handle = tasks.spawn(reconcile_group(group, ctx, tx.clone()));
            group_items.insert(handle.id(), indices);
        }
        drop(tx);

        let mut panicked: Vec<usize> = Vec::new();
        let timed_out = tokio::time::timeout_at(
            deadline,
            join_groups(&mut tasks, &group_items, &mut panicked, batch_id),
        )
        .await
        .is_err();
        if timed_out {
            tracing::warn!(
                %batch_id,
                deadline = ?self.config.batch_deadline,
                "Batch deadline reached; cancelling"
            );
            cancel.cancel();
            let wound_down = tokio::time::timeout(
                self.config.cancel_grace,
                join_groups(&mut tasks, &group_items, &mut panicked, batch_id),
            )
            .await
            .is_ok();
            if !wound_down {
                tracing::warn!(
                    %batch_id,
                    grace = ?self.config.cancel_grace,
                    stuck_groups = tasks.len(),
                    "Reconcilers ignored cancellation; aborting"
                );
                tasks.abort_all();
            }
        }

        while let Ok(resolution) = rx.try_recv() {
            outcomes[resolution.index] = Some(resolution.outcome);
        }
        for index in panicked {
            if outcomes[index].is_none() {
                outcomes[index] = Some(ItemOutcome::failed(FailureReason::Internal(
                    "reconciler panicked".to_string(),
                )));
            }
        }

        let resolutions = ids
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (id, outcome))| {
                let outcome = outcome.unwrap_or_else(|| {
                    if timed_out {
                        ItemOutcome::failed(FailureReason::Timeout)
                    } else {
                        ItemOutcome::failed(FailureReason::Internal(
                            "item was not reconciled".to_string(),
                        ))
                    }
                });
                Resolution::new(index, id, outcome)
            });
        let result = BatchResult::from_resolutions(resolutions);

        tracing::info!(
            %batch_id,
            accepted = result.accepted.len(),
            conflicts = result.conflicts.len(),
            failed = result.failed.len(),
            timed_out,
            elapsed = ?started.elapsed(),
            "Batch reconciled"
        );
        result
    }

    /// Remove expired append-only entries from the store.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(self.clock.now_millis()).await
    }
}

/// Wait for every group task, recording the items of groups that panicked.
async fn join_groups(
    tasks: &mut JoinSet<()>,
    group_items: &HashMap<tokio::task::Id, Vec<usize>>,
    panicked: &mut Vec<usize>,
    batch_id: Uuid,
) {
    while let Some(joined) = tasks.join_next().await {
        let Err(error) = joined else {
            continue;
        };
        tracing::error!(%batch_id, %error, "Reconciler task failed");
        if let Some(indices) = group_items.get(&error.id()) {
            panicked.extend_from_slice(indices);
        }
    }
}
