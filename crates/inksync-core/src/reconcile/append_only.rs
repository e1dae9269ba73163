//! Insert-once reconciler for messages
//!
//! Messages never conflict. The first delivery of an id is stored with a
//! retention expiry; duplicates are accepted without touching the store.

use async_trait::async_trait;

use super::{ReconcileContext, Reconciler};
use crate::error::Result;
use crate::models::{ItemOutcome, SyncRecord};
use crate::store::{EntityWrite, PutOutcome};

/// Insert-once reconciler for `message` records.
///
/// There is no staleness check: the first delivery of an id is stored with
/// a retention expiry and every later delivery is an accepted no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOnlyReconciler;

#[async_trait]
impl Reconciler for AppendOnlyReconciler {
    fn name(&self) -> &'static str {
        "append_only"
    }

    async fn reconcile(&self, record: &SyncRecord, ctx: &ReconcileContext) -> Result<ItemOutcome> {
        let key = record.key();
        let now = ctx.clock.now_millis();
        let write = EntityWrite::new(record.payload.clone(), now)
            .expiring_at(now.saturating_add(ctx.config.message_ttl_millis()));

        ctx.ensure_active()?;
        match ctx.store.conditional_put(&key, write, None).await? {
            PutOutcome::Written(_) => {}
            PutOutcome::Stale => {
                tracing::debug!(entity_class = %key.class, "Duplicate delivery ignored");
            }
        }
        Ok(ItemOutcome::Accepted)
    }
}
