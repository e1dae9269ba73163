//! In-process entity store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{is_live, EntityStore, EntityWrite, PutOutcome};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::models::{EntityKey, StoredEntity};

#[derive(Debug, Clone)]
struct StoredRow {
    entity: StoredEntity,
    expires_at: Option<i64>,
}

/// Store backed by a mutex-guarded map. Check and write happen under one
/// lock acquisition.
pub struct MemoryStore {
    rows: Mutex<HashMap<EntityKey, StoredRow>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of rows held, expired or not
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<StoredEntity>> {
        let now = self.clock.now_millis();
        let rows = self.rows.lock().await;
        Ok(rows
            .get(key)
            .filter(|row| is_live(row.expires_at, now))
            .map(|row| row.entity.clone()))
    }

    async fn conditional_put(
        &self,
        key: &EntityKey,
        write: EntityWrite,
        expected_last_modified: Option<i64>,
    ) -> Result<PutOutcome> {
        let now = self.clock.now_millis();
        let mut rows = self.rows.lock().await;

        let current = rows
            .get(key)
            .filter(|row| is_live(row.expires_at, now))
            .map(|row| row.entity.last_modified);
        if current != expected_last_modified {
            return Ok(PutOutcome::Stale);
        }

        let expires_at = write.expires_at;
        let entity = write.into_entity(&key.id);
        rows.insert(
            key.clone(),
            StoredRow {
                entity: entity.clone(),
                expires_at,
            },
        );
        Ok(PutOutcome::Written(entity))
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, row| is_live(row.expires_at, now));
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }
}
