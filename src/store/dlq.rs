//! Dead-letter persistence (§3 DlqMessage, §4.1, §4.7).

use base64::Engine;
use sqlx::{AnyPool, Row};

use crate::logger::truncate_for_log;
use crate::time::now_ms;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlqStatus {
    Pending,
    Replaying,
    Replayed,
    Acknowledged,
}

impl DlqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DlqStatus::Pending => "pending",
            DlqStatus::Replaying => "replaying",
            DlqStatus::Replayed => "replayed",
            DlqStatus::Acknowledged => "acknowledged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DlqStatus::Pending),
            "replaying" => Some(DlqStatus::Replaying),
            "replayed" => Some(DlqStatus::Replayed),
            "acknowledged" => Some(DlqStatus::Acknowledged),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceQueue {
    BeerEnrichment,
    DescriptionCleanup,
}

impl SourceQueue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceQueue::BeerEnrichment => "beer-enrichment",
            SourceQueue::DescriptionCleanup => "description-cleanup",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DlqMessage {
    pub id: i64,
    pub message_id: String,
    pub beer_id: String,
    pub beer_name: String,
    pub brewer: String,
    pub failed_at: i64,
    pub failure_count: i32,
    pub source_queue: String,
    pub raw_message: String,
    pub status: String,
    pub replay_count: i32,
    pub replayed_at: Option<i64>,
    pub acknowledged_at: Option<i64>,
}

pub struct DlqIngest<'a> {
    pub message_id: &'a str,
    pub beer_id: &'a str,
    pub beer_name: &'a str,
    pub brewer: &'a str,
    pub failed_at: i64,
    pub failure_count: i32,
    pub source_queue: SourceQueue,
    pub raw_message: &'a str,
}

/// `INSERT … ON CONFLICT(message_id) DO UPDATE` re-opening a row to `pending`
/// with refreshed `failed_at`/`failure_count`/`raw_message` (§4.7.1, invariant P4).
pub async fn ingest(pool: &AnyPool, msg: &DlqIngest<'_>) -> anyhow::Result<()> {
    tracing::info!(
        message_id = %msg.message_id,
        beer_id = %msg.beer_id,
        source_queue = %msg.source_queue.as_str(),
        raw_message = %truncate_for_log(msg.raw_message),
        "persisting DLQ message"
    );

    sqlx::query(
        r#"
INSERT INTO dlq_messages (
  message_id, beer_id, beer_name, brewer, failed_at, failure_count,
  source_queue, raw_message, status, replay_count
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0)
ON CONFLICT(message_id) DO UPDATE SET
  status = 'pending',
  failed_at = excluded.failed_at,
  failure_count = excluded.failure_count,
  raw_message = excluded.raw_message;
"#,
    )
    .bind(msg.message_id)
    .bind(msg.beer_id)
    .bind(msg.beer_name)
    .bind(msg.brewer)
    .bind(msg.failed_at)
    .bind(msg.failure_count)
    .bind(msg.source_queue.as_str())
    .bind(msg.raw_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// `UPDATE … SET status='replaying' WHERE id IN (…) AND status='pending'`
/// (§4.7.2 step 1). Returns the count actually claimed — authoritative,
/// distinct from the number requested (P5).
pub async fn claim_for_replay(pool: &AnyPool, ids: &[i64]) -> anyhow::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "UPDATE dlq_messages SET status = 'replaying' WHERE id IN ({placeholders}) AND status = 'pending';"
    );
    let mut q = sqlx::query(&sql);
    for id in ids {
        q = q.bind(*id);
    }
    let res = q.execute(pool).await?;
    Ok(res.rows_affected())
}

pub async fn fetch_replaying(pool: &AnyPool, ids: &[i64]) -> anyhow::Result<Vec<DlqMessage>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "SELECT * FROM dlq_messages WHERE id IN ({placeholders}) AND status = 'replaying';"
    );
    let mut q = sqlx::query(&sql);
    for id in ids {
        q = q.bind(*id);
    }
    let rows = q.fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_dlq).collect())
}

/// `replaying -> pending` (enqueue failed).
pub async fn rollback(pool: &AnyPool, ids: &[i64]) -> anyhow::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "UPDATE dlq_messages SET status = 'pending' WHERE id IN ({placeholders}) AND status = 'replaying';"
    );
    let mut q = sqlx::query(&sql);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.execute(pool).await?.rows_affected())
}

/// `replaying -> replayed`, bumps `replay_count`, stamps `replayed_at`.
pub async fn mark_replayed(pool: &AnyPool, ids: &[i64], now: i64) -> anyhow::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "UPDATE dlq_messages SET status = 'replayed', replay_count = replay_count + 1, replayed_at = ? \
         WHERE id IN ({placeholders}) AND status = 'replaying';"
    );
    let mut q = sqlx::query(&sql).bind(now);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.execute(pool).await?.rows_affected())
}

/// `pending -> acknowledged`, bounded to 100 ids by the caller (§4.7.2).
pub async fn mark_acknowledged(pool: &AnyPool, ids: &[i64], now: i64) -> anyhow::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!(
        "UPDATE dlq_messages SET status = 'acknowledged', acknowledged_at = ? \
         WHERE id IN ({placeholders}) AND status = 'pending';"
    );
    let mut q = sqlx::query(&sql).bind(now);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.execute(pool).await?.rows_affected())
}

/// Opaque cursor: base64 of `{failed_at}:{id}`, descending `(failed_at, id)` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DlqCursor {
    pub failed_at: i64,
    pub id: i64,
}

impl DlqCursor {
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", self.failed_at, self.id))
    }

    pub fn decode(s: &str) -> anyhow::Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|_| anyhow::anyhow!("invalid cursor"))?;
        let text = String::from_utf8(raw).map_err(|_| anyhow::anyhow!("invalid cursor"))?;
        let (a, b) = text.split_once(':').ok_or_else(|| anyhow::anyhow!("invalid cursor"))?;
        Ok(Self {
            failed_at: a.parse().map_err(|_| anyhow::anyhow!("invalid cursor"))?,
            id: b.parse().map_err(|_| anyhow::anyhow!("invalid cursor"))?,
        })
    }
}

pub struct ListDlqParams<'a> {
    pub status: Option<&'a str>,
    pub beer_id: Option<&'a str>,
    pub cursor: Option<DlqCursor>,
    pub limit: i64,
}

pub struct ListDlqPage {
    pub items: Vec<DlqMessage>,
    pub has_more: bool,
}

/// Cursor-paginated listing (§4.1, §4.7.3). Fetches one extra row over
/// `limit` to compute `has_more` without a second round trip.
pub async fn list(pool: &AnyPool, params: ListDlqParams<'_>) -> anyhow::Result<ListDlqPage> {
    let status = params.status.unwrap_or("pending");
    let fetch_limit = params.limit + 1;

    let rows = match params.cursor {
        Some(c) => {
            sqlx::query(
                r#"
SELECT * FROM dlq_messages
WHERE status = ?
  AND (? IS NULL OR beer_id = ?)
  AND (failed_at < ? OR (failed_at = ? AND id < ?))
ORDER BY failed_at DESC, id DESC
LIMIT ?;
"#,
            )
            .bind(status)
            .bind(params.beer_id)
            .bind(params.beer_id)
            .bind(c.failed_at)
            .bind(c.failed_at)
            .bind(c.id)
            .bind(fetch_limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
SELECT * FROM dlq_messages
WHERE status = ? AND (? IS NULL OR beer_id = ?)
ORDER BY failed_at DESC, id DESC
LIMIT ?;
"#,
            )
            .bind(status)
            .bind(params.beer_id)
            .bind(params.beer_id)
            .bind(fetch_limit)
            .fetch_all(pool)
            .await?
        }
    };

    let mut items: Vec<DlqMessage> = rows.iter().map(row_to_dlq).collect();
    let has_more = items.len() as i64 > params.limit;
    if has_more {
        items.truncate(params.limit as usize);
    }

    Ok(ListDlqPage { items, has_more })
}

/// Batched delete looping until a batch returns fewer than `batch_limit` rows
/// (§4.1 purgeDlq, §4.7.4).
pub async fn purge(
    pool: &AnyPool,
    status: DlqStatus,
    older_than: i64,
    batch_limit: i64,
) -> anyhow::Result<u64> {
    let timestamp_col = match status {
        DlqStatus::Acknowledged => "acknowledged_at",
        DlqStatus::Replayed => "replayed_at",
        _ => anyhow::bail!("purge only supports acknowledged/replayed status"),
    };

    let mut total = 0u64;
    loop {
        let sql = format!(
            r#"
DELETE FROM dlq_messages WHERE id IN (
  SELECT id FROM dlq_messages
  WHERE status = ? AND {timestamp_col} IS NOT NULL AND {timestamp_col} < ?
  LIMIT ?
);
"#
        );
        let res = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(older_than)
            .bind(batch_limit)
            .execute(pool)
            .await?;
        let affected = res.rows_affected();
        total += affected;
        if affected < batch_limit as u64 {
            break;
        }
    }

    Ok(total)
}

#[derive(Clone, Debug, Default)]
pub struct DlqStats {
    pub counts_by_status: Vec<(String, i64)>,
    pub oldest_pending_age_ms: Option<i64>,
    pub top_failing_brewers: Vec<(String, i64)>,
    pub last_24h_count: i64,
    pub most_replayed_beers: Vec<(String, i32)>,
}

pub async fn stats(pool: &AnyPool, now: i64) -> anyhow::Result<DlqStats> {
    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM dlq_messages GROUP BY status;",
    )
    .fetch_all(pool)
    .await?;
    let counts_by_status = status_rows
        .iter()
        .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("n")))
        .collect();

    let oldest = sqlx::query(
        "SELECT MIN(failed_at) AS oldest FROM dlq_messages WHERE status = 'pending';",
    )
    .fetch_one(pool)
    .await?;
    let oldest_pending_age_ms: Option<i64> = oldest
        .get::<Option<i64>, _>("oldest")
        .map(|t| (now - t).max(0));

    let brewers = sqlx::query(
        r#"
SELECT brewer, COUNT(*) AS n FROM dlq_messages
WHERE status = 'pending'
GROUP BY brewer ORDER BY n DESC LIMIT 10;
"#,
    )
    .fetch_all(pool)
    .await?;
    let top_failing_brewers = brewers
        .iter()
        .map(|r| (r.get::<String, _>("brewer"), r.get::<i64, _>("n")))
        .collect();

    let last_24h = sqlx::query("SELECT COUNT(*) AS n FROM dlq_messages WHERE failed_at >= ?;")
        .bind(now - 24 * 60 * 60 * 1000)
        .fetch_one(pool)
        .await?;
    let last_24h_count = last_24h.get::<i64, _>("n");

    let replayed = sqlx::query(
        r#"
SELECT beer_id, replay_count FROM dlq_messages
WHERE replay_count > 0 ORDER BY replay_count DESC LIMIT 10;
"#,
    )
    .fetch_all(pool)
    .await?;
    let most_replayed_beers = replayed
        .iter()
        .map(|r| (r.get::<String, _>("beer_id"), r.get::<i32, _>("replay_count")))
        .collect();

    Ok(DlqStats {
        counts_by_status,
        oldest_pending_age_ms,
        top_failing_brewers,
        last_24h_count,
        most_replayed_beers,
    })
}

fn row_to_dlq(r: &sqlx::any::AnyRow) -> DlqMessage {
    DlqMessage {
        id: r.get("id"),
        message_id: r.get("message_id"),
        beer_id: r.get("beer_id"),
        beer_name: r.get("beer_name"),
        brewer: r.get("brewer"),
        failed_at: r.get("failed_at"),
        failure_count: r.get("failure_count"),
        source_queue: r.get("source_queue"),
        raw_message: r.get("raw_message"),
        status: r.get("status"),
        replay_count: r.get("replay_count"),
        replayed_at: r.get("replayed_at"),
        acknowledged_at: r.get("acknowledged_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::any::AnyPoolOptions;
    use uuid::Uuid;

    async fn setup_db() -> AnyPool {
        sqlx::any::install_default_drivers();
        let name = Uuid::new_v4().to_string();
        let conn = format!("sqlite:file:{name}?mode=memory&cache=shared");
        let pool = AnyPoolOptions::new().max_connections(5).connect(&conn).await.unwrap();
        sqlx::query(
            r#"
CREATE TABLE dlq_messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  message_id TEXT NOT NULL UNIQUE,
  beer_id TEXT NOT NULL,
  beer_name TEXT NOT NULL,
  brewer TEXT NOT NULL,
  failed_at BIGINT NOT NULL,
  failure_count INTEGER NOT NULL,
  source_queue TEXT NOT NULL,
  raw_message TEXT NOT NULL,
  status TEXT NOT NULL,
  replay_count INTEGER NOT NULL DEFAULT 0,
  replayed_at BIGINT,
  acknowledged_at BIGINT
);"#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn ingest_msg<'a>(message_id: &'a str, beer_id: &'a str) -> DlqIngest<'a> {
        DlqIngest {
            message_id,
            beer_id,
            beer_name: "Test IPA",
            brewer: "Test Brewery",
            failed_at: 1_000,
            failure_count: 3,
            source_queue: SourceQueue::BeerEnrichment,
            raw_message: "{}",
        }
    }

    #[tokio::test]
    async fn reingest_reopens_pending_row() {
        let pool = setup_db().await;
        ingest(&pool, &ingest_msg("m1", "b1")).await.unwrap();

        let claimed = claim_for_replay(&pool, &[1]).await.unwrap();
        assert_eq!(claimed, 1);

        // Conflict re-ingest must reopen to pending even from `replaying`.
        let mut second = ingest_msg("m1", "b1");
        second.failed_at = 2_000;
        second.failure_count = 4;
        ingest(&pool, &second).await.unwrap();

        let row = sqlx::query("SELECT status, failed_at, failure_count FROM dlq_messages WHERE message_id = 'm1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("status"), "pending");
        assert_eq!(row.get::<i64, _>("failed_at"), 2_000);
        assert_eq!(row.get::<i32, _>("failure_count"), 4);
    }

    #[tokio::test]
    async fn only_one_of_two_claimers_wins_the_row() {
        let pool = setup_db().await;
        ingest(&pool, &ingest_msg("m1", "b1")).await.unwrap();
        let pool = std::sync::Arc::new(pool);

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..2 {
            let p = pool.clone();
            set.spawn(async move { claim_for_replay(&p, &[1]).await.unwrap() });
        }
        let mut total = 0;
        while let Some(r) = set.join_next().await {
            total += r.unwrap();
        }
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn cursor_roundtrips() {
        let c = DlqCursor { failed_at: 123456, id: 42 };
        let encoded = c.encode();
        let decoded = DlqCursor::decode(&encoded).unwrap();
        assert_eq!(c, decoded);
    }

    #[tokio::test]
    async fn list_reports_has_more_with_one_extra_row() {
        let pool = setup_db().await;
        for i in 0..5 {
            ingest(&pool, &ingest_msg(&format!("m{i}"), "b1")).await.unwrap();
        }

        let page = list(
            &pool,
            ListDlqParams { status: Some("pending"), beer_id: None, cursor: None, limit: 3 },
        )
        .await
        .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.has_more);
    }
}
