//! Engine tuning knobs.
//!
//! Binaries build an [`EngineConfig`] from their own configuration source
//! (environment for the API server, flags for the CLI); the core only sees
//! the resolved values.

use std::time::Duration;

const DEFAULT_BATCH_DEADLINE: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BATCH_ITEMS: usize = 500;
const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_AGGREGATE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_PUT_ATTEMPTS: u32 = 5;
const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Limits and lifetimes applied by the batch coordinator and reconcilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Overall time budget for one batch
    pub batch_deadline: Duration,
    /// Envelopes with more items than this are rejected whole
    pub max_batch_items: usize,
    /// Retention window for append-only records
    pub message_ttl: Duration,
    /// Lifetime of the cached copy of a merged aggregate
    pub aggregate_cache_ttl: Duration,
    /// Conditional-write attempts per item before giving up
    pub max_put_attempts: u32,
    /// How long cancelled groups may take to wind down before being aborted
    pub cancel_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_deadline: DEFAULT_BATCH_DEADLINE,
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            message_ttl: DEFAULT_MESSAGE_TTL,
            aggregate_cache_ttl: DEFAULT_AGGREGATE_CACHE_TTL,
            max_put_attempts: DEFAULT_MAX_PUT_ATTEMPTS,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    #[must_use]
    pub const fn with_max_batch_items(mut self, max_items: usize) -> Self {
        self.max_batch_items = max_items;
        self
    }

    #[must_use]
    pub const fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_aggregate_cache_ttl(mut self, ttl: Duration) -> Self {
        self.aggregate_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Retention window in milliseconds, saturating at `i64::MAX`.
    pub fn message_ttl_millis(&self) -> i64 {
        i64::try_from(self.message_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_deadline, Duration::from_secs(10));
        assert_eq!(config.max_batch_items, 500);
        assert!(config.max_put_attempts >= 1);
    }

    #[test]
    fn message_ttl_millis_converts() {
        let config = EngineConfig::default().with_message_ttl(Duration::from_secs(60));
        assert_eq!(config.message_ttl_millis(), 60_000);
    }
}
