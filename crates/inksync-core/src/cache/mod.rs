//! Advisory cache hooks
//!
//! The cache is never read for correctness. Reconcilers invalidate or
//! refresh entries after a successful write; a cache that is down leaves
//! stale entries behind, which is acceptable, but must never change an
//! item's outcome. [`CacheInvalidator`] enforces that by logging and
//! swallowing every cache error.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use memory::MemoryCache;

/// Combines the currently cached value (if any) with fresh state.
pub type MergeFn = Box<dyn FnOnce(Option<Value>) -> Value + Send>;

/// Cache backend
#[async_trait]
pub trait Cache: Send + Sync {
    /// Drop the entry for `key`.
    async fn invalidate(&self, key: &str) -> Result<()>;

    /// Replace the entry for `key` with `merge(current)` and reset its TTL.
    async fn merge_set(&self, key: &str, ttl: Duration, merge: MergeFn) -> Result<()>;
}

/// Cache that stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn invalidate(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn merge_set(&self, _key: &str, _ttl: Duration, _merge: MergeFn) -> Result<()> {
        Ok(())
    }
}

/// Side-effect hook used by reconcilers after a successful write.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn Cache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Invalidate `key`; failures are logged only.
    pub async fn invalidate(&self, key: &str) {
        if let Err(error) = self.cache.invalidate(key).await {
            tracing::warn!(cache_key = key, %error, "Cache invalidation failed; entry may be stale");
        }
    }

    /// Refresh `key` through `merge`; failures are logged only.
    pub async fn refresh(&self, key: &str, ttl: Duration, merge: MergeFn) {
        if let Err(error) = self.cache.merge_set(key, ttl, merge).await {
            tracing::warn!(cache_key = key, %error, "Cache refresh failed; entry may be stale");
        }
    }
}
