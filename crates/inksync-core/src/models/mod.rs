//! Data models for inksync

mod aggregate;
mod entity_class;
mod outcome;
mod record;

pub use aggregate::{fact_type_of, AggregateState, FieldEntry, FACT_TYPE_FIELD};
pub use entity_class::{ClassKind, EntityClass};
pub use outcome::{BatchResult, ConflictEntry, FailedEntry, FailureReason, ItemOutcome, Resolution};
pub use record::{EntityKey, Provenance, StoredEntity, SyncRecord};
