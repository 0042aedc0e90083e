use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    admin::AdminOrchestrator,
    breaker::CircuitBreaker,
    cleanup::{
        types::{CleanupMessage, LlmCleanupResult},
        CleanupPipeline,
    },
    collaborators::{AnalyticsEmitter, AuditLog, LlmAbvClient, LlmCleanupClient, QueueProducer, TaplistClient, TaplistBeer},
    config::AppConfig,
    db::Db,
    dlq::DlqOrchestrator,
    enrichment::{types::EnrichmentMessage, EnrichmentPipeline},
    logger::init_tracing,
    store::Store,
    time::today_utc,
};

/// Stands in for the real Workers-AI HTTP client until one is wired.
struct DummyLlmCleanupClient;

#[async_trait::async_trait]
impl LlmCleanupClient for DummyLlmCleanupClient {
    async fn clean(&self, message: &CleanupMessage) -> anyhow::Result<LlmCleanupResult> {
        // TODO: replace with the real Workers-AI cleanup call.
        Ok(LlmCleanupResult { response: message.brew_description.clone() })
    }
}

/// Stands in for the real Perplexity-style search LLM client.
struct DummyLlmAbvClient;

#[async_trait::async_trait]
impl LlmAbvClient for DummyLlmAbvClient {
    async fn lookup_abv(&self, _beer_name: &str, _brewer: &str) -> anyhow::Result<String> {
        // TODO: replace with the real upstream ABV lookup call.
        Ok("unknown".to_string())
    }
}

/// Stands in for the real message broker until one is wired.
struct DummyQueueProducer;

#[async_trait::async_trait]
impl QueueProducer for DummyQueueProducer {
    async fn send_enrichment(&self, messages: &[EnrichmentMessage]) -> anyhow::Result<()> {
        tracing::info!(count = messages.len(), "would enqueue enrichment messages");
        Ok(())
    }

    async fn send_cleanup(&self, messages: &[CleanupMessage]) -> anyhow::Result<()> {
        tracing::info!(count = messages.len(), "would enqueue cleanup messages");
        Ok(())
    }

    async fn send_dlq_replay(&self, source_queue: &str, _raw_message: &str, delay_seconds: u32) -> anyhow::Result<()> {
        tracing::info!(source_queue, delay_seconds, "would replay dlq message");
        Ok(())
    }
}

struct DummyAuditLog;

#[async_trait::async_trait]
impl AuditLog for DummyAuditLog {
    async fn record(&self, event: &str, detail: serde_json::Value) -> anyhow::Result<()> {
        tracing::info!(event, %detail, "audit event");
        Ok(())
    }
}

struct DummyAnalyticsEmitter;

#[async_trait::async_trait]
impl AnalyticsEmitter for DummyAnalyticsEmitter {
    async fn emit(&self, event: &str, detail: serde_json::Value) {
        tracing::debug!(event, %detail, "analytics event");
    }
}

struct DummyTaplistClient;

#[async_trait::async_trait]
impl TaplistClient for DummyTaplistClient {
    async fn fetch_taplist(&self, _store_id: &str) -> anyhow::Result<Vec<TaplistBeer>> {
        // TODO: replace with the real upstream taplist HTTP client.
        Ok(Vec::new())
    }
}

/// Connects, migrates, and returns the durable Store handle.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Store> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;
    Ok(Store::new(db.pool))
}

/// Periodic sweep: rate-limit/quota GC plus DLQ purge, wired the way the
/// original system expects an external scheduler to drive it (§4.7.4, §A.7).
fn start_maintenance_loop(store: Store, dlq: Arc<DlqOrchestrator>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let stale_bucket = pipeline::time::minute_bucket(pipeline::time::now_ms()) - 60;
            if let Err(err) = store.purge_rate_limits(stale_bucket).await {
                tracing::warn!(error = %err, "rate-limit GC sweep failed");
            }

            let cutoff_date = today_utc();
            for scope in [pipeline::store::quota::QuotaScope::Enrichment, pipeline::store::quota::QuotaScope::Cleanup] {
                if let Err(err) = store.purge_daily_quota(scope, &cutoff_date).await {
                    tracing::warn!(error = %err, "daily quota GC sweep failed");
                }
            }

            if let Err(err) = dlq.purge_expired().await {
                tracing::warn!(error = %err, "dlq purge sweep failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting beer enrichment pipeline...");

    let cfg = AppConfig::from_env()?;
    let store = init_store(&cfg).await?;

    let breaker = Arc::new(CircuitBreaker::new(cfg.breaker_slow_call_limit, cfg.breaker_slow_threshold, cfg.breaker_reset_after));
    let queue: Arc<dyn QueueProducer> = Arc::new(DummyQueueProducer);
    let llm_cleanup: Arc<dyn LlmCleanupClient> = Arc::new(DummyLlmCleanupClient);
    let llm_abv: Arc<dyn LlmAbvClient> = Arc::new(DummyLlmAbvClient);
    let _audit: Arc<dyn AuditLog> = Arc::new(DummyAuditLog);
    let _analytics: Arc<dyn AnalyticsEmitter> = Arc::new(DummyAnalyticsEmitter);
    let _taplist: Arc<dyn TaplistClient> = Arc::new(DummyTaplistClient);

    let _cleanup_pipeline = CleanupPipeline::new(store.clone(), breaker.clone(), llm_cleanup, queue.clone(), cfg.clone());
    let _enrichment_pipeline = EnrichmentPipeline::new(store.clone(), llm_abv, cfg.clone());
    let dlq = Arc::new(DlqOrchestrator::new(store.clone(), queue.clone(), cfg.clone()));
    let _admin = AdminOrchestrator::new(store.clone(), queue.clone(), cfg.clone());

    start_maintenance_loop(store, dlq, Duration::from_secs(60));

    tracing::info!("Pipeline started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}
