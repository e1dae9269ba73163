use std::time::Duration;

use inksync_core::SyncEngine;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodically delete expired append-only records.
pub fn spawn_retention_sweep(engine: SyncEngine, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&engine).await;
        }
    })
}

async fn sweep_once(engine: &SyncEngine) -> u64 {
    match engine.purge_expired().await {
        Ok(0) => 0,
        Ok(removed) => {
            tracing::info!(removed, "Retention sweep removed expired records");
            removed
        }
        Err(error) => {
            tracing::warn!(%error, "Retention sweep failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inksync_core::cache::NoopCache;
    use inksync_core::clock::ManualClock;
    use inksync_core::store::MemoryStore;
    use inksync_core::{BatchRequest, EngineConfig};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn sweep_removes_only_expired_messages() {
        let clock = Arc::new(ManualClock::new(1_000));
        let engine = SyncEngine::new(
            Arc::new(MemoryStore::with_clock(clock.clone())),
            Arc::new(NoopCache),
            EngineConfig::default().with_message_ttl(Duration::from_secs(60)),
        )
        .with_clock(clock.clone());

        let request: BatchRequest = serde_json::from_value(json!({
            "deviceId": "phone",
            "ownerId": "studio-1",
            "items": [
                {"id": "m1", "entityClass": "message", "payload": "hi", "clientTimestamp": 1},
                {"id": "c1", "entityClass": "customer", "payload": {"n": 1}, "clientTimestamp": 1}
            ]
        }))
        .unwrap();
        engine.submit(request).await.unwrap();

        assert_eq!(sweep_once(&engine).await, 0);
        clock.advance(60_000);
        assert_eq!(sweep_once(&engine).await, 1);
        assert_eq!(sweep_once(&engine).await, 0);
    }
}
