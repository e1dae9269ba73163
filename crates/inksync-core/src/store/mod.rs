//! Durable entity storage
//!
//! The store is the only mutable state shared between batches. Every write
//! goes through [`EntityStore::conditional_put`], which compares the stored
//! stamp with the one the caller observed and refuses the write when they
//! differ. Reconcilers build their atomic check-and-set on top of that.

mod libsql_store;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{EntityKey, StoredEntity};

pub use libsql_store::LibSqlStore;
pub use memory::MemoryStore;

/// New state for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityWrite {
    pub payload: Value,
    /// Server stamp (Unix ms) recorded as `lastModified`
    pub last_modified: i64,
    /// Unix ms after which the entity reads as absent
    pub expires_at: Option<i64>,
}

impl EntityWrite {
    pub const fn new(payload: Value, last_modified: i64) -> Self {
        Self {
            payload,
            last_modified,
            expires_at: None,
        }
    }

    #[must_use]
    pub const fn expiring_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub(crate) fn into_entity(self, id: &str) -> StoredEntity {
        StoredEntity {
            id: id.to_string(),
            payload: self.payload,
            last_modified: self.last_modified,
        }
    }
}

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The write was applied
    Written(StoredEntity),
    /// The stored stamp no longer matches the expected one; nothing written
    Stale,
}

/// Per-entity storage with compare-and-set writes
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Current live state of an entity, or `None` when absent or expired.
    async fn get(&self, key: &EntityKey) -> Result<Option<StoredEntity>>;

    /// Write `write` only if the live entity's `lastModified` equals
    /// `expected_last_modified` (`None` means "must be absent").
    ///
    /// The comparison and the write happen atomically.
    async fn conditional_put(
        &self,
        key: &EntityKey,
        write: EntityWrite,
        expected_last_modified: Option<i64>,
    ) -> Result<PutOutcome>;

    /// Delete entities whose expiry is at or before `now`. Returns how many
    /// were removed.
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}

pub(crate) const fn is_live(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at > now,
        None => true,
    }
}
