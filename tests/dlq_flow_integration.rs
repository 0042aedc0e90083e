use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::cleanup::types::CleanupMessage;
use pipeline::collaborators::QueueProducer;
use pipeline::config::AppConfig;
use pipeline::db::schema;
use pipeline::dlq::DlqOrchestrator;
use pipeline::enrichment::types::EnrichmentMessage;
use pipeline::store::dlq::{DlqIngest, ListDlqParams, SourceQueue};
use pipeline::store::Store;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

struct NoopQueue;

#[async_trait]
impl QueueProducer for NoopQueue {
    async fn send_enrichment(&self, _messages: &[EnrichmentMessage]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn send_cleanup(&self, _messages: &[CleanupMessage]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn send_dlq_replay(&self, _source_queue: &str, _raw_message: &str, _delay_seconds: u32) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn setup_store() -> Store {
    sqlx::any::install_default_drivers();
    let name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let pool = AnyPoolOptions::new().max_connections(5).connect(&conn).await.unwrap();
    schema::migrate(&pool).await.unwrap();
    Store::new(Arc::new(pool))
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        allowed_origin: "https://example.com".to_string(),
        rate_limit_rpm: 60,
        daily_enrichment_limit: 500,
        monthly_enrichment_limit: 2_000,
        daily_cleanup_limit: 1_000,
        max_cleanup_concurrency: 4,
        cleanup_timeout: Duration::from_millis(500),
        db_retry_attempts: 3,
        db_retry_base_delay: Duration::from_millis(1),
        enrichment_enabled: true,
        enrichment_pacing_delay: Duration::from_millis(1),
        enrichment_rate_limit_retry_delay: Duration::from_secs(120),
        breaker_slow_call_limit: 3,
        breaker_slow_threshold: Duration::from_millis(200),
        breaker_reset_after: Duration::from_millis(60_000),
        dlq_purge_batch_limit: 1_000,
        dlq_purge_older_than: chrono::Duration::days(30),
        api_key: String::new(),
        admin_secret: String::new(),
        perplexity_api_key: String::new(),
        flying_saucer_api_base: String::new(),
    }
}

/// End-to-end DLQ lifecycle: ingest -> list (pending) -> replay -> acknowledge,
/// exercising the Store and the orchestration layer together the way an
/// admin HTTP handler would.
#[tokio::test]
async fn full_dlq_lifecycle_ingest_replay_acknowledge() {
    let store = setup_store().await;
    let orchestrator = DlqOrchestrator::new(store.clone(), Arc::new(NoopQueue), test_config());

    orchestrator
        .ingest(&DlqIngest {
            message_id: "msg-1",
            beer_id: "beer-1",
            beer_name: "Test IPA",
            brewer: "Test Brewery",
            failed_at: 1_000,
            failure_count: 3,
            source_queue: SourceQueue::BeerEnrichment,
            raw_message: r#"{"beer_id":"beer-1"}"#,
        })
        .await
        .unwrap();

    let pending = orchestrator
        .list(ListDlqParams { status: Some("pending"), beer_id: None, cursor: None, limit: 10 })
        .await
        .unwrap();
    assert_eq!(pending.items.len(), 1);
    let id = pending.items[0].id;

    let replay = orchestrator.replay(&[id], 0).await.unwrap();
    assert_eq!(replay.claimed, 1);
    assert_eq!(replay.enqueued, 1);

    let replayed = orchestrator
        .list(ListDlqParams { status: Some("replayed"), beer_id: None, cursor: None, limit: 10 })
        .await
        .unwrap();
    assert_eq!(replayed.items.len(), 1);
    assert_eq!(replayed.items[0].replay_count, 1);

    // Replay doesn't move it to acknowledged; a separate ack call does, and
    // only from `pending`, so acking the replayed row is a no-op.
    let acked = orchestrator.acknowledge(&[id]).await.unwrap();
    assert_eq!(acked, 0);

    let stats = orchestrator.stats().await.unwrap();
    assert!(stats.counts_by_status.iter().any(|(status, n)| status == "replayed" && *n == 1));
}

/// Re-ingesting the same message_id while it sits in a non-pending state
/// reopens it to pending with refreshed fields (P4, §3 DlqMessage invariant).
#[tokio::test]
async fn reingest_after_replay_reopens_to_pending() {
    let store = setup_store().await;
    let orchestrator = DlqOrchestrator::new(store.clone(), Arc::new(NoopQueue), test_config());

    orchestrator
        .ingest(&DlqIngest {
            message_id: "msg-2",
            beer_id: "beer-2",
            beer_name: "Test Stout",
            brewer: "Test Brewery",
            failed_at: 1_000,
            failure_count: 1,
            source_queue: SourceQueue::DescriptionCleanup,
            raw_message: "{}",
        })
        .await
        .unwrap();

    let pending = orchestrator
        .list(ListDlqParams { status: Some("pending"), beer_id: None, cursor: None, limit: 10 })
        .await
        .unwrap();
    let id = pending.items[0].id;
    orchestrator.replay(&[id], 0).await.unwrap();

    orchestrator
        .ingest(&DlqIngest {
            message_id: "msg-2",
            beer_id: "beer-2",
            beer_name: "Test Stout",
            brewer: "Test Brewery",
            failed_at: 5_000,
            failure_count: 2,
            source_queue: SourceQueue::DescriptionCleanup,
            raw_message: r#"{"retry":true}"#,
        })
        .await
        .unwrap();

    let pending_again = orchestrator
        .list(ListDlqParams { status: Some("pending"), beer_id: None, cursor: None, limit: 10 })
        .await
        .unwrap();
    assert_eq!(pending_again.items.len(), 1);
    assert_eq!(pending_again.items[0].failed_at, 5_000);
    assert_eq!(pending_again.items[0].failure_count, 2);
}
