//! Fixed-window per-key admission counter (§4.2). Deliberately not a token
//! bucket — see spec Non-goals.

use rand::Rng;
use sqlx::{AnyPool, Row};

use crate::time::{bucket_reset_at, minute_bucket, now_ms};

#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: u64,
}

/// `check(key, limit_per_minute)` (§4.2). On any store failure this fails
/// open — returns `allowed=true` with the full limit as remaining — because
/// availability is favored over precision for this path.
pub async fn check(pool: &AnyPool, key: &str, limit_per_minute: u32) -> AdmissionDecision {
    let now = now_ms();
    let bucket = minute_bucket(now);
    let reset_at = bucket_reset_at(bucket);

    let result = sqlx::query(
        r#"
INSERT INTO rate_limits (client_identifier, minute_bucket, request_count)
VALUES (?, ?, 1)
ON CONFLICT(client_identifier, minute_bucket) DO UPDATE
SET request_count = rate_limits.request_count + 1
RETURNING request_count;
"#,
    )
    .bind(key)
    .bind(bucket)
    .fetch_one(pool)
    .await;

    let count = match result {
        Ok(row) => row.get::<i64, _>("request_count"),
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "admission store failure; failing open");
            return AdmissionDecision {
                allowed: true,
                remaining: limit_per_minute,
                reset_at,
            };
        }
    };

    // Sampled background GC — bounded, best-effort, never blocks the caller's decision.
    if rand::thread_rng().gen_bool(0.01) {
        if let Err(e) = gc(pool, bucket).await {
            tracing::warn!(error = %e, "rate limit GC failed");
        }
    }

    let allowed = count <= limit_per_minute as i64;
    let remaining = (limit_per_minute as i64 - count).max(0) as u32;

    AdmissionDecision {
        allowed,
        remaining,
        reset_at,
    }
}

async fn gc(pool: &AnyPool, bucket: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM rate_limits WHERE minute_bucket < ?;")
        .bind(bucket - 60)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn purge_rate_limits(pool: &AnyPool, older_minute_bucket: i64) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM rate_limits WHERE minute_bucket < ?;")
        .bind(older_minute_bucket)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
