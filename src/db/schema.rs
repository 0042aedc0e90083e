use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS enriched_beers (
  id TEXT PRIMARY KEY,
  brew_name TEXT NOT NULL,
  brewer TEXT NOT NULL,
  brew_description TEXT,
  description_hash TEXT,
  brew_description_cleaned TEXT,
  description_cleaned_at BIGINT,
  cleanup_source TEXT,
  abv DOUBLE PRECISION,
  confidence DOUBLE PRECISION,
  enrichment_source TEXT,
  enrichment_status TEXT NOT NULL DEFAULT 'pending',
  last_seen_at BIGINT NOT NULL,
  updated_at BIGINT NOT NULL,
  extra TEXT NOT NULL DEFAULT '{}'
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS rate_limits (
  client_identifier TEXT NOT NULL,
  minute_bucket BIGINT NOT NULL,
  request_count BIGINT NOT NULL,
  PRIMARY KEY (client_identifier, minute_bucket)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS enrichment_limits (
  date TEXT PRIMARY KEY,
  request_count BIGINT NOT NULL,
  last_updated BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS cleanup_limits (
  date TEXT PRIMARY KEY,
  request_count BIGINT NOT NULL,
  last_updated BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS dlq_messages (
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
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS audit_log (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  occurred_at BIGINT NOT NULL,
  event TEXT NOT NULL,
  detail TEXT NOT NULL DEFAULT '{}'
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_dlq_status_failed_at ON dlq_messages(status, failed_at DESC, id DESC);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_dlq_beer_id ON dlq_messages(beer_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_rate_limits_bucket ON rate_limits(minute_bucket);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_beers_abv ON enriched_beers(abv);"#)
        .execute(pool)
        .await?;

    Ok(())
}
