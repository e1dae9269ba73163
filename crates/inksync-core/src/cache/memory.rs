use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Cache, MergeFn};
use crate::error::Result;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-process cache with per-entry TTL
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired value for `key`
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Number of entries held, expired or not
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Seed an entry directly
    pub async fn insert(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.entries.lock().await.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn merge_set(&self, key: &str, ttl: Duration, merge: MergeFn) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let current = entries
            .remove(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value);

        // Sweep every expired entry, not just this key.
        entries.retain(|_, entry| entry.expires_at > now);

        entries.insert(
            key.to_string(),
            CacheEntry {
                value: merge(current),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = MemoryCache::new();
        cache
            .insert("appointment:A1", json!({"v": 1}), Duration::from_secs(60))
            .await;
        assert!(cache.get("appointment:A1").await.is_some());

        cache.invalidate("appointment:A1").await.unwrap();
        assert!(cache.get("appointment:A1").await.is_none());
    }

    #[tokio::test]
    async fn merge_set_sees_current_value() {
        let cache = MemoryCache::new();
        cache
            .insert("k", json!({"a": 1}), Duration::from_secs(60))
            .await;

        cache
            .merge_set(
                "k",
                Duration::from_secs(60),
                Box::new(|current| {
                    let mut value = current.unwrap_or_else(|| json!({}));
                    value["b"] = json!(2);
                    value
                }),
            )
            .await
            .unwrap();

        assert_eq!(cache.get("k").await, Some(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = MemoryCache::new();
        cache.insert("k", json!(1), Duration::ZERO).await;
        assert!(cache.get("k").await.is_none());

        cache
            .merge_set(
                "k",
                Duration::from_secs(60),
                Box::new(|current| {
                    assert!(current.is_none());
                    json!(2)
                }),
            )
            .await
            .unwrap();
        assert_eq!(cache.get("k").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn merge_set_sweeps_other_expired_entries() {
        let cache = MemoryCache::new();
        cache.insert("old-a", json!(1), Duration::ZERO).await;
        cache.insert("old-b", json!(2), Duration::ZERO).await;
        cache.insert("live", json!(3), Duration::from_secs(60)).await;

        cache
            .merge_set("fresh", Duration::from_secs(60), Box::new(|_| json!(4)))
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("live").await, Some(json!(3)));
    }
}
