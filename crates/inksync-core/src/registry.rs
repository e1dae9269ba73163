//! Reconciler registry and type router

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::models::{
    ClassKind, EntityClass, FailureReason, ItemOutcome, Provenance, Resolution, SyncRecord,
};
use crate::reconcile::{
    AggregateReconciler, AppendOnlyReconciler, MutableRecordReconciler, Reconciler, RecordGroup,
};
use crate::wire::EnvelopeItem;

/// Maps each entity class to the one reconciler responsible for it.
#[derive(Clone, Default)]
pub struct ReconcilerRegistry {
    reconcilers: HashMap<EntityClass, Arc<dyn Reconciler>>,
}

/// Items split into per-class groups plus items that were resolved while
/// routing.
pub struct RoutedBatch {
    pub groups: Vec<RecordGroup>,
    pub resolved: Vec<Resolution>,
}

impl ReconcilerRegistry {
    /// Registry with no reconcilers; every item routes to `unsupported_type`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in reconciler for every known class.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let mutable: Arc<dyn Reconciler> = Arc::new(MutableRecordReconciler);
        for class in EntityClass::ALL {
            let reconciler: Arc<dyn Reconciler> = match class.kind() {
                ClassKind::MutableRecord => mutable.clone(),
                ClassKind::AppendOnly => Arc::new(AppendOnlyReconciler),
                ClassKind::MergeableAggregate => Arc::new(AggregateReconciler),
            };
            registry.register(class, reconciler);
        }
        registry
    }

    /// Register `reconciler` for `class`, returning the one it replaces.
    pub fn register(
        &mut self,
        class: EntityClass,
        reconciler: Arc<dyn Reconciler>,
    ) -> Option<Arc<dyn Reconciler>> {
        self.reconcilers.insert(class, reconciler)
    }

    pub fn get(&self, class: EntityClass) -> Option<&Arc<dyn Reconciler>> {
        self.reconcilers.get(&class)
    }

    /// Group items by class, preserving submission order inside each group.
    ///
    /// Items with an unknown or unregistered class, or without a payload or
    /// integer client timestamp, are resolved immediately as failures.
    pub fn route(&self, items: Vec<EnvelopeItem>, provenance: &Arc<Provenance>) -> RoutedBatch {
        let mut groups: Vec<RecordGroup> = Vec::new();
        let mut group_of: HashMap<EntityClass, usize> = HashMap::new();
        let mut resolved = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            let Some((class, reconciler)) = item
                .entity_class
                .as_deref()
                .and_then(EntityClass::from_wire)
                .and_then(|class| self.get(class).map(|reconciler| (class, reconciler)))
            else {
                resolved.push(Resolution::new(
                    index,
                    item.id,
                    ItemOutcome::failed(FailureReason::UnsupportedType),
                ));
                continue;
            };

            let record = match into_record(item, class, provenance) {
                Ok(record) => record,
                Err(resolution) => {
                    resolved.push(resolution.at(index));
                    continue;
                }
            };

            let slot = *group_of.entry(class).or_insert_with(|| {
                groups.push(RecordGroup {
                    reconciler: reconciler.clone(),
                    records: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].records.push((index, record));
        }

        RoutedBatch { groups, resolved }
    }
}

struct Rejected {
    id: String,
    reason: FailureReason,
}

impl Rejected {
    fn at(self, index: usize) -> Resolution {
        Resolution::new(index, self.id, ItemOutcome::failed(self.reason))
    }
}

fn into_record(
    item: EnvelopeItem,
    class: EntityClass,
    provenance: &Arc<Provenance>,
) -> Result<SyncRecord, Rejected> {
    let EnvelopeItem {
        id,
        payload,
        client_timestamp,
        ..
    } = item;

    let Some(payload) = payload else {
        return Err(Rejected {
            id,
            reason: FailureReason::InvalidRecord("payload is required".to_string()),
        });
    };
    let Some(client_timestamp) = client_timestamp.as_ref().and_then(Value::as_i64) else {
        return Err(Rejected {
            id,
            reason: FailureReason::InvalidRecord(
                "clientTimestamp must be an integer Unix ms value".to_string(),
            ),
        });
    };

    Ok(SyncRecord {
        id,
        entity_class: class,
        payload,
        client_timestamp,
        provenance: provenance.clone(),
    })
}
