//! Dead-letter queue orchestration (§4.7): ingest wiring, the replay driver,
//! acknowledge, listing, and scheduled purge. The durable state machine
//! itself lives in [`crate::store::dlq`]; this module adds the batching and
//! queue-producer wiring around it.

use std::sync::Arc;

use crate::collaborators::QueueProducer;
use crate::config::AppConfig;
use crate::store::dlq::{DlqCursor, DlqIngest, DlqStats, DlqStatus, ListDlqPage, ListDlqParams, SourceQueue};
use crate::store::Store;
use crate::time::now_ms;

/// Replay is bounded to 50 ids per call (§4.7.2).
const REPLAY_BATCH_LIMIT: usize = 50;
/// Acknowledge is bounded to 100 ids per call (§4.7.2).
const ACKNOWLEDGE_BATCH_LIMIT: usize = 100;

pub struct DlqOrchestrator {
    store: Store,
    queue: Arc<dyn QueueProducer>,
    config: AppConfig,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayOutcome {
    pub requested: usize,
    pub claimed: u64,
    pub enqueued: u64,
    pub rolled_back: u64,
}

impl DlqOrchestrator {
    pub fn new(store: Store, queue: Arc<dyn QueueProducer>, config: AppConfig) -> Self {
        Self { store, queue, config }
    }

    /// Persists a message a consumer has exhausted retries on (§4.7.1). Ack
    /// on success; retry the original message on storage failure so it is
    /// not silently dropped.
    pub async fn ingest(&self, msg: &DlqIngest<'_>) -> anyhow::Result<()> {
        self.store.ingest_dlq(msg).await
    }

    /// Claims up to 50 ids, attempts to re-enqueue each with its
    /// `delay_seconds` clamped non-negative, and marks replayed/rolls back
    /// per-id depending on whether the enqueue succeeded (§4.7.2).
    pub async fn replay(&self, ids: &[i64], delay_seconds: i64) -> anyhow::Result<ReplayOutcome> {
        let ids: Vec<i64> = ids.iter().take(REPLAY_BATCH_LIMIT).copied().collect();
        let delay_seconds = delay_seconds.max(0) as u32;

        let claimed = self.store.claim_dlq_for_replay(&ids).await?;
        if claimed == 0 {
            return Ok(ReplayOutcome { requested: ids.len(), claimed: 0, enqueued: 0, rolled_back: 0 });
        }

        let rows = self.store.fetch_replaying(&ids).await?;
        let mut succeeded = Vec::with_capacity(rows.len());
        let mut failed = Vec::new();

        for row in &rows {
            let source_queue = row.source_queue.as_str();
            match self.queue.send_dlq_replay(source_queue, &row.raw_message, delay_seconds).await {
                Ok(()) => succeeded.push(row.id),
                Err(err) => {
                    tracing::warn!(error = %err, dlq_id = row.id, "dlq replay enqueue failed");
                    failed.push(row.id);
                }
            }
        }

        let enqueued = if succeeded.is_empty() {
            0
        } else {
            self.store.mark_replayed(&succeeded, now_ms() as i64).await?
        };
        let rolled_back = if failed.is_empty() { 0 } else { self.store.rollback_dlq(&failed).await? };

        Ok(ReplayOutcome { requested: ids.len(), claimed, enqueued, rolled_back })
    }

    /// `pending -> acknowledged`, bounded to 100 ids (§4.7.2).
    pub async fn acknowledge(&self, ids: &[i64]) -> anyhow::Result<u64> {
        let ids: Vec<i64> = ids.iter().take(ACKNOWLEDGE_BATCH_LIMIT).copied().collect();
        self.store.mark_acknowledged(&ids, now_ms() as i64).await
    }

    pub async fn list(&self, params: ListDlqParams<'_>) -> anyhow::Result<ListDlqPage> {
        self.store.list_dlq(params).await
    }

    pub async fn stats(&self) -> anyhow::Result<DlqStats> {
        self.store.dlq_stats(now_ms() as i64).await
    }

    /// Scheduled purge: acknowledged/replayed rows older than the configured
    /// retention, batched (§4.7.4).
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let cutoff = now_ms() as i64 - self.config.dlq_purge_older_than.num_milliseconds();
        let mut total = 0u64;
        for status in [DlqStatus::Acknowledged, DlqStatus::Replayed] {
            total += self.store.purge_dlq(status, cutoff, self.config.dlq_purge_batch_limit).await?;
        }
        Ok(total)
    }
}

pub use crate::store::dlq::DlqMessage as Message;
pub type Cursor = DlqCursor;
pub type SourceQueueKind = SourceQueue;
