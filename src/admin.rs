//! The manual admin enrichment trigger (§4.8): read-only quota inspection
//! and a single bounded batch emission. Never reserves quota itself — the
//! enrichment pipeline does that per-message when the batch is consumed.

use std::sync::Arc;

use crate::collaborators::QueueProducer;
use crate::config::AppConfig;
use crate::enrichment::types::EnrichmentMessage;
use crate::store::quota::QuotaScope;
use crate::store::Store;
use crate::time::today_utc;

/// Hard ceiling on a single trigger call, independent of the caller-supplied
/// limit (§4.8 step 4).
const MAX_TRIGGER_BATCH: i64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    KillSwitched,
    MonthlyLimitReached,
    DailyLimitReached,
    NoEligibleBeers,
}

#[derive(Clone, Debug)]
pub enum TriggerOutcome {
    Skipped(SkipReason),
    Enqueued { beer_ids: Vec<String> },
}

pub struct AdminOrchestrator {
    store: Store,
    queue: Arc<dyn QueueProducer>,
    config: AppConfig,
}

impl AdminOrchestrator {
    pub fn new(store: Store, queue: Arc<dyn QueueProducer>, config: AppConfig) -> Self {
        Self { store, queue, config }
    }

    /// Runs the §4.8 flow for a caller-requested batch size.
    pub async fn trigger(&self, requested_limit: i64, exclude_dlq_pending: bool) -> anyhow::Result<TriggerOutcome> {
        if !self.config.enrichment_enabled {
            return Ok(TriggerOutcome::Skipped(SkipReason::KillSwitched));
        }

        let today = today_utc();
        let monthly_used = self.store.month_sum(QuotaScope::Enrichment, &today).await?;
        if monthly_used >= self.config.monthly_enrichment_limit {
            return Ok(TriggerOutcome::Skipped(SkipReason::MonthlyLimitReached));
        }
        let monthly_remaining = self.config.monthly_enrichment_limit - monthly_used;

        let daily_used = self.store.today_count(QuotaScope::Enrichment).await?;
        if daily_used >= self.config.daily_enrichment_limit {
            return Ok(TriggerOutcome::Skipped(SkipReason::DailyLimitReached));
        }
        let daily_remaining = self.config.daily_enrichment_limit - daily_used;

        let effective_batch = requested_limit
            .min(daily_remaining)
            .min(monthly_remaining)
            .min(MAX_TRIGGER_BATCH)
            .max(0);
        if effective_batch == 0 {
            return Ok(TriggerOutcome::Skipped(SkipReason::NoEligibleBeers));
        }

        let beer_ids = self.store.select_unenriched(effective_batch, exclude_dlq_pending).await?;
        if beer_ids.is_empty() {
            return Ok(TriggerOutcome::Skipped(SkipReason::NoEligibleBeers));
        }

        let mut messages = Vec::with_capacity(beer_ids.len());
        for id in &beer_ids {
            if let Some(beer) = self.store.get_beer(id).await? {
                messages.push(EnrichmentMessage { beer_id: beer.id, beer_name: beer.brew_name, brewer: beer.brewer });
            }
        }

        self.queue.send_enrichment(&messages).await?;

        Ok(TriggerOutcome::Enqueued { beer_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::any::AnyPoolOptions;
    use uuid::Uuid;

    struct NoopQueue;

    #[async_trait]
    impl QueueProducer for NoopQueue {
        async fn send_enrichment(&self, _messages: &[EnrichmentMessage]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn send_cleanup(&self, _messages: &[crate::cleanup::types::CleanupMessage]) -> anyhow::Result<()> {
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
        crate::db::schema::migrate(&pool).await.unwrap();
        Store::new(Arc::new(pool))
    }

    fn test_config(daily_limit: i64, monthly_limit: i64) -> AppConfig {
        AppConfig {
            database_url: String::new(),
            allowed_origin: "https://example.com".to_string(),
            rate_limit_rpm: 60,
            daily_enrichment_limit: daily_limit,
            monthly_enrichment_limit: monthly_limit,
            daily_cleanup_limit: 1_000,
            max_cleanup_concurrency: 4,
            cleanup_timeout: std::time::Duration::from_millis(500),
            db_retry_attempts: 3,
            db_retry_base_delay: std::time::Duration::from_millis(1),
            enrichment_enabled: true,
            enrichment_pacing_delay: std::time::Duration::from_millis(1),
            enrichment_rate_limit_retry_delay: std::time::Duration::from_secs(120),
            breaker_slow_call_limit: 3,
            breaker_slow_threshold: std::time::Duration::from_millis(200),
            breaker_reset_after: std::time::Duration::from_millis(60_000),
            dlq_purge_batch_limit: 1_000,
            dlq_purge_older_than: chrono::Duration::days(30),
            api_key: String::new(),
            admin_secret: String::new(),
            perplexity_api_key: String::new(),
            flying_saucer_api_base: String::new(),
        }
    }

    #[tokio::test]
    async fn caps_effective_batch_to_the_lowest_remaining_ceiling() {
        let store = setup_store().await;
        for i in 0..10 {
            store
                .upsert_beer(&crate::store::beer::BeerUpsert {
                    id: format!("beer-{i}"),
                    brew_name: "Test Beer".to_string(),
                    brewer: "Test Brewery".to_string(),
                    brew_description: None,
                    description_hash: None,
                    extracted_abv: None,
                    extra: serde_json::json!({}),
                })
                .await
                .unwrap();
        }

        let orchestrator = AdminOrchestrator::new(store.clone(), Arc::new(NoopQueue), test_config(3, 500));
        let outcome = orchestrator.trigger(10, false).await.unwrap();
        match outcome {
            TriggerOutcome::Enqueued { beer_ids } => assert_eq!(beer_ids.len(), 3),
            other => panic!("expected Enqueued, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_when_kill_switched() {
        let store = setup_store().await;
        let mut config = test_config(10, 500);
        config.enrichment_enabled = false;
        let orchestrator = AdminOrchestrator::new(store, Arc::new(NoopQueue), config);
        let outcome = orchestrator.trigger(5, false).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Skipped(SkipReason::KillSwitched)));
    }
}
