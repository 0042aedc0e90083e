//! Atomic daily slot reservation (§4.3), used by the cleanup/enrichment
//! pipelines and the read-only admin trigger path.

use sqlx::{AnyPool, Row};

use crate::time::today_utc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaScope {
    Enrichment,
    Cleanup,
}

impl QuotaScope {
    fn table(&self) -> &'static str {
        match self {
            QuotaScope::Enrichment => "enrichment_limits",
            QuotaScope::Cleanup => "cleanup_limits",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchReservation {
    pub reserved: i64,
    pub remaining: i64,
}

/// `reserveBatch(scope, requested, daily_limit)` (§4.3). All-or-nothing: a
/// request that would exceed `daily_limit` reserves nothing, by design —
/// partial reservations would require a second round trip.
pub async fn reserve_batch(
    pool: &AnyPool,
    scope: QuotaScope,
    requested: i64,
    daily_limit: i64,
) -> anyhow::Result<BatchReservation> {
    let table = scope.table();
    let date = today_utc();

    sqlx::query(&format!(
        "INSERT INTO {table} (date, request_count, last_updated) VALUES (?, 0, ?) ON CONFLICT(date) DO NOTHING;"
    ))
    .bind(&date)
    .bind(crate::time::now_ms() as i64)
    .execute(pool)
    .await?;

    let old_row = sqlx::query(&format!("SELECT request_count FROM {table} WHERE date = ?;"))
        .bind(&date)
        .fetch_one(pool)
        .await?;
    let old_count: i64 = old_row.get("request_count");

    let new_row = sqlx::query(&format!(
        r#"
UPDATE {table}
SET request_count = CASE
      WHEN request_count + ? <= ? THEN request_count + ?
      ELSE request_count
    END,
    last_updated = ?
WHERE date = ?
RETURNING request_count;
"#
    ))
    .bind(requested)
    .bind(daily_limit)
    .bind(requested)
    .bind(crate::time::now_ms() as i64)
    .bind(&date)
    .fetch_one(pool)
    .await?;
    let new_count: i64 = new_row.get("request_count");

    Ok(BatchReservation {
        reserved: new_count - old_count,
        remaining: (daily_limit - new_count).max(0),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotReservation {
    pub new_count: i64,
    pub reserved: bool,
}

/// Per-message slot-by-slot variant (§4.3): increments by exactly 1 only when
/// `request_count < daily_limit`.
pub async fn reserve_slot(
    pool: &AnyPool,
    scope: QuotaScope,
    daily_limit: i64,
) -> anyhow::Result<SlotReservation> {
    let table = scope.table();
    let date = today_utc();

    sqlx::query(&format!(
        "INSERT INTO {table} (date, request_count, last_updated) VALUES (?, 0, ?) ON CONFLICT(date) DO NOTHING;"
    ))
    .bind(&date)
    .bind(crate::time::now_ms() as i64)
    .execute(pool)
    .await?;

    let before_row = sqlx::query(&format!("SELECT request_count FROM {table} WHERE date = ?;"))
        .bind(&date)
        .fetch_one(pool)
        .await?;
    let before: i64 = before_row.get("request_count");

    let row = sqlx::query(&format!(
        r#"
UPDATE {table}
SET request_count = CASE WHEN request_count < ? THEN request_count + 1 ELSE request_count END,
    last_updated = ?
WHERE date = ?
RETURNING request_count;
"#
    ))
    .bind(daily_limit)
    .bind(crate::time::now_ms() as i64)
    .bind(&date)
    .fetch_one(pool)
    .await?;
    let new_count: i64 = row.get("request_count");

    Ok(SlotReservation {
        new_count,
        reserved: new_count > before,
    })
}

/// Today's reserved count for `scope`, read-only (used by §4.8 admin trigger).
pub async fn today_count(pool: &AnyPool, scope: QuotaScope) -> anyhow::Result<i64> {
    let table = scope.table();
    let date = today_utc();
    let row = sqlx::query(&format!("SELECT request_count FROM {table} WHERE date = ?;"))
        .bind(&date)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get::<i64, _>("request_count")).unwrap_or(0))
}

/// Sum of the current UTC month's daily rows for `scope`.
pub async fn month_sum(pool: &AnyPool, scope: QuotaScope, today: &str) -> anyhow::Result<i64> {
    let (first, last) = crate::time::month_range_utc(today)?;
    let table = scope.table();
    let row = sqlx::query(&format!(
        "SELECT COALESCE(SUM(request_count), 0) AS total FROM {table} WHERE date >= ? AND date <= ?;"
    ))
    .bind(first)
    .bind(last)
    .fetch_one(pool)
    .await?;
    Ok(row.get::<i64, _>("total"))
}

pub async fn purge_daily_quota(
    pool: &AnyPool,
    scope: QuotaScope,
    cutoff_date: &str,
) -> anyhow::Result<u64> {
    let table = scope.table();
    let res = sqlx::query(&format!("DELETE FROM {table} WHERE date < ?;"))
        .bind(cutoff_date)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
