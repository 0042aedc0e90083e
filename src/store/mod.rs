//! The Store is the sole owner of all durable state (§3 Ownership). Every
//! other component holds only a handle to it.

pub mod admission;
pub mod beer;
pub mod dlq;
pub mod quota;

use std::sync::Arc;
use std::time::Duration;

use sqlx::AnyPool;

use crate::logger::warn_if_slow;

#[derive(Clone)]
pub struct Store {
    pool: Arc<AnyPool>,
}

impl Store {
    pub fn new(pool: Arc<AnyPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn upsert_beer(&self, upsert: &beer::BeerUpsert) -> anyhow::Result<beer::Beer> {
        warn_if_slow("db_upsert_beer", Duration::from_millis(100), async {
            beer::upsert_beer(&self.pool, upsert).await
        })
        .await
    }

    pub async fn update_enrichment(
        &self,
        beer_id: &str,
        abv: Option<f64>,
        source: Option<beer::EnrichmentSource>,
        confidence: Option<f64>,
        status: beer::EnrichmentStatus,
    ) -> anyhow::Result<()> {
        beer::update_enrichment(&self.pool, beer_id, abv, source, confidence, status).await
    }

    pub async fn record_cleanup(
        &self,
        beer_id: &str,
        cleaned: Option<&str>,
        cleaned_at: i64,
        cleanup_source: Option<beer::CleanupSource>,
        abv_update: Option<(f64, beer::EnrichmentSource, f64)>,
    ) -> anyhow::Result<()> {
        beer::record_cleanup(&self.pool, beer_id, cleaned, cleaned_at, cleanup_source, abv_update).await
    }

    pub async fn get_beer(&self, beer_id: &str) -> anyhow::Result<Option<beer::Beer>> {
        beer::get_beer(&self.pool, beer_id).await
    }

    pub async fn select_unenriched(
        &self,
        limit: i64,
        exclude_dlq_pending: bool,
    ) -> anyhow::Result<Vec<String>> {
        beer::select_unenriched(&self.pool, limit, exclude_dlq_pending).await
    }

    pub async fn check_admission(&self, key: &str, limit_per_minute: u32) -> admission::AdmissionDecision {
        admission::check(&self.pool, key, limit_per_minute).await
    }

    pub async fn reserve_batch(
        &self,
        scope: quota::QuotaScope,
        requested: i64,
        daily_limit: i64,
    ) -> anyhow::Result<quota::BatchReservation> {
        warn_if_slow("db_reserve_batch", Duration::from_millis(100), async {
            quota::reserve_batch(&self.pool, scope, requested, daily_limit).await
        })
        .await
    }

    pub async fn reserve_slot(
        &self,
        scope: quota::QuotaScope,
        daily_limit: i64,
    ) -> anyhow::Result<quota::SlotReservation> {
        quota::reserve_slot(&self.pool, scope, daily_limit).await
    }

    pub async fn today_count(&self, scope: quota::QuotaScope) -> anyhow::Result<i64> {
        quota::today_count(&self.pool, scope).await
    }

    pub async fn month_sum(&self, scope: quota::QuotaScope, today: &str) -> anyhow::Result<i64> {
        quota::month_sum(&self.pool, scope, today).await
    }

    pub async fn ingest_dlq(&self, msg: &dlq::DlqIngest<'_>) -> anyhow::Result<()> {
        dlq::ingest(&self.pool, msg).await
    }

    pub async fn claim_dlq_for_replay(&self, ids: &[i64]) -> anyhow::Result<u64> {
        dlq::claim_for_replay(&self.pool, ids).await
    }

    pub async fn fetch_replaying(&self, ids: &[i64]) -> anyhow::Result<Vec<dlq::DlqMessage>> {
        dlq::fetch_replaying(&self.pool, ids).await
    }

    pub async fn rollback_dlq(&self, ids: &[i64]) -> anyhow::Result<u64> {
        dlq::rollback(&self.pool, ids).await
    }

    pub async fn mark_replayed(&self, ids: &[i64], now: i64) -> anyhow::Result<u64> {
        dlq::mark_replayed(&self.pool, ids, now).await
    }

    pub async fn mark_acknowledged(&self, ids: &[i64], now: i64) -> anyhow::Result<u64> {
        dlq::mark_acknowledged(&self.pool, ids, now).await
    }

    pub async fn list_dlq(&self, params: dlq::ListDlqParams<'_>) -> anyhow::Result<dlq::ListDlqPage> {
        dlq::list(&self.pool, params).await
    }

    pub async fn purge_dlq(
        &self,
        status: dlq::DlqStatus,
        older_than: i64,
        batch_limit: i64,
    ) -> anyhow::Result<u64> {
        dlq::purge(&self.pool, status, older_than, batch_limit).await
    }

    pub async fn dlq_stats(&self, now: i64) -> anyhow::Result<dlq::DlqStats> {
        dlq::stats(&self.pool, now).await
    }

    pub async fn purge_rate_limits(&self, older_minute_bucket: i64) -> anyhow::Result<u64> {
        admission::purge_rate_limits(&self.pool, older_minute_bucket).await
    }

    pub async fn purge_daily_quota(
        &self,
        scope: quota::QuotaScope,
        cutoff_date: &str,
    ) -> anyhow::Result<u64> {
        quota::purge_daily_quota(&self.pool, scope, cutoff_date).await
    }
}
