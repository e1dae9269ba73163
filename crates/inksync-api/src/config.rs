use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use inksync_core::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration. Nothing here is secret, so the derived `Debug` is
/// safe to log.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// libSQL database file; `None` keeps all state in memory
    pub database_path: Option<PathBuf>,
    pub batch_deadline: Duration,
    pub max_batch_items: usize,
    pub message_ttl: Duration,
    pub aggregate_cache_ttl: Duration,
    pub retention_sweep_interval: Duration,
    pub rate_limit_window: Duration,
    pub sync_batch_rate_limit_per_window: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "INKSYNC_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = optional_trimmed(&lookup, "INKSYNC_DATABASE_PATH").map(PathBuf::from);

        let batch_deadline_ms: u64 =
            ranged(&lookup, "INKSYNC_BATCH_DEADLINE_MS", "10000", 100..=120_000)?;
        let max_batch_items: usize =
            ranged(&lookup, "INKSYNC_MAX_BATCH_ITEMS", "500", 1..=10_000)?;
        let message_ttl_secs: u64 = ranged(
            &lookup,
            "INKSYNC_MESSAGE_TTL_SECS",
            "2592000",
            60..=31_536_000,
        )?;
        let aggregate_cache_ttl_secs: u64 =
            ranged(&lookup, "INKSYNC_AGGREGATE_CACHE_TTL_SECS", "300", 1..=86_400)?;
        let retention_sweep_secs: u64 =
            ranged(&lookup, "INKSYNC_RETENTION_SWEEP_SECS", "3600", 10..=86_400)?;
        let rate_limit_window_secs: u64 =
            ranged(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10..=3_600)?;
        let sync_batch_rate_limit_per_window: u32 =
            ranged(&lookup, "SYNC_BATCH_RATE_LIMIT_PER_WINDOW", "120", 1..=10_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            batch_deadline: Duration::from_millis(batch_deadline_ms),
            max_batch_items,
            message_ttl: Duration::from_secs(message_ttl_secs),
            aggregate_cache_ttl: Duration::from_secs(aggregate_cache_ttl_secs),
            retention_sweep_interval: Duration::from_secs(retention_sweep_secs),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            sync_batch_rate_limit_per_window,
        })
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_batch_deadline(self.batch_deadline)
            .with_max_batch_items(self.max_batch_items)
            .with_message_ttl(self.message_ttl)
            .with_aggregate_cache_ttl(self.aggregate_cache_ttl)
    }
}

/// Parse an integer variable and check it against `range`.
fn ranged<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display,
{
    let bounds = format!("[{}, {}]", range.start(), range.end());
    let value = value_or_default(lookup, name, default)
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be an integer in {bounds}")))?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!("{name} must be in {bounds}")));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    let map: HashMap<&str, &str> = HashMap::new();
    AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
        .expect("defaults are valid")
}
