//! Beer rows: the durable description/ABV store (§3 Beer, §4.1 upsertBeer /
//! updateEnrichment).

use sqlx::{AnyPool, Row};

use crate::time::now_ms;

/// Source of the cleaned description, closed enumeration (§3, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupSource {
    WorkersAi,
    FallbackCircuitBreaker,
    FallbackQuotaExceeded,
}

impl CleanupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupSource::WorkersAi => "workers-ai",
            CleanupSource::FallbackCircuitBreaker => "fallback-circuit-breaker",
            CleanupSource::FallbackQuotaExceeded => "fallback-quota-exceeded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workers-ai" => Some(CleanupSource::WorkersAi),
            "fallback-circuit-breaker" => Some(CleanupSource::FallbackCircuitBreaker),
            "fallback-quota-exceeded" => Some(CleanupSource::FallbackQuotaExceeded),
            _ => None,
        }
    }
}

/// Provenance of the ABV value, closed enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrichmentSource {
    Description,
    DescriptionFallback,
    Perplexity,
}

impl EnrichmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentSource::Description => "description",
            EnrichmentSource::DescriptionFallback => "description-fallback",
            EnrichmentSource::Perplexity => "perplexity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "description" => Some(EnrichmentSource::Description),
            "description-fallback" => Some(EnrichmentSource::DescriptionFallback),
            "perplexity" => Some(EnrichmentSource::Perplexity),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrichmentStatus {
    Pending,
    Enriched,
    NotFound,
    Skipped,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::NotFound => "not_found",
            EnrichmentStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "enriched" => EnrichmentStatus::Enriched,
            "not_found" => EnrichmentStatus::NotFound,
            "skipped" => EnrichmentStatus::Skipped,
            _ => EnrichmentStatus::Pending,
        }
    }
}

/// A beer row as understood by the core. `extra` preserves upstream fields the
/// core doesn't model, verbatim, for response merging (§9 duck-typed taplist).
#[derive(Clone, Debug)]
pub struct Beer {
    pub id: String,
    pub brew_name: String,
    pub brewer: String,
    pub brew_description: Option<String>,
    pub description_hash: Option<String>,
    pub brew_description_cleaned: Option<String>,
    pub description_cleaned_at: Option<i64>,
    pub cleanup_source: Option<CleanupSource>,
    pub abv: Option<f64>,
    pub confidence: Option<f64>,
    pub enrichment_source: Option<EnrichmentSource>,
    pub enrichment_status: EnrichmentStatus,
    pub last_seen_at: i64,
    pub updated_at: i64,
    pub extra: serde_json::Value,
}

/// Fields supplied by an ingest pass (taplist poll). ABV extracted from the
/// description, if any, is folded in by `upsert_beer` per I-B1/§4.1.
#[derive(Clone, Debug)]
pub struct BeerUpsert {
    pub id: String,
    pub brew_name: String,
    pub brewer: String,
    pub brew_description: Option<String>,
    pub description_hash: Option<String>,
    pub extracted_abv: Option<f64>,
    pub extra: serde_json::Value,
}

/// `INSERT … ON CONFLICT(id) DO UPDATE` that refuses to overwrite a row whose
/// `enrichment_source = 'perplexity'` (I-B1). Returns the resulting row via
/// `RETURNING`.
pub async fn upsert_beer(pool: &AnyPool, upsert: &BeerUpsert) -> anyhow::Result<Beer> {
    let now = now_ms() as i64;
    let extra_json = upsert.extra.to_string();

    let (abv, confidence, source) = match upsert.extracted_abv {
        Some(abv) => (Some(abv), Some(0.9_f64), Some(EnrichmentSource::Description.as_str())),
        None => (None, None, None),
    };

    let row = sqlx::query(
        r#"
INSERT INTO enriched_beers (
  id, brew_name, brewer, brew_description, description_hash,
  abv, confidence, enrichment_source, enrichment_status,
  last_seen_at, updated_at, extra
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
ON CONFLICT(id) DO UPDATE SET
  brew_name = excluded.brew_name,
  brewer = excluded.brewer,
  brew_description = excluded.brew_description,
  description_hash = excluded.description_hash,
  abv = CASE
    WHEN enriched_beers.enrichment_source = 'perplexity' THEN enriched_beers.abv
    WHEN excluded.abv IS NOT NULL THEN excluded.abv
    ELSE enriched_beers.abv
  END,
  confidence = CASE
    WHEN enriched_beers.enrichment_source = 'perplexity' THEN enriched_beers.confidence
    WHEN excluded.abv IS NOT NULL THEN excluded.confidence
    ELSE enriched_beers.confidence
  END,
  enrichment_source = CASE
    WHEN enriched_beers.enrichment_source = 'perplexity' THEN enriched_beers.enrichment_source
    WHEN excluded.abv IS NOT NULL THEN excluded.enrichment_source
    ELSE enriched_beers.enrichment_source
  END,
  last_seen_at = excluded.last_seen_at,
  updated_at = excluded.updated_at,
  extra = excluded.extra
RETURNING
  id, brew_name, brewer, brew_description, description_hash,
  brew_description_cleaned, description_cleaned_at, cleanup_source,
  abv, confidence, enrichment_source, enrichment_status,
  last_seen_at, updated_at, extra;
"#,
    )
    .bind(&upsert.id)
    .bind(&upsert.brew_name)
    .bind(&upsert.brewer)
    .bind(&upsert.brew_description)
    .bind(&upsert.description_hash)
    .bind(abv)
    .bind(confidence)
    .bind(source)
    .bind(now)
    .bind(now)
    .bind(extra_json)
    .fetch_one(pool)
    .await?;

    row_to_beer(&row)
}

/// Unconditional update of the ABV triple + status transition (§4.1 updateEnrichment).
pub async fn update_enrichment(
    pool: &AnyPool,
    beer_id: &str,
    abv: Option<f64>,
    source: Option<EnrichmentSource>,
    confidence: Option<f64>,
    status: EnrichmentStatus,
) -> anyhow::Result<()> {
    let now = now_ms() as i64;

    sqlx::query(
        r#"
UPDATE enriched_beers
SET abv = ?, enrichment_source = ?, confidence = ?, enrichment_status = ?, updated_at = ?
WHERE id = ?;
"#,
    )
    .bind(abv)
    .bind(source.map(|s| s.as_str()))
    .bind(confidence)
    .bind(status.as_str())
    .bind(now)
    .bind(beer_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores a cleaned description and, where a validator accepted a cleanup
/// result, the resulting `cleanup_source`. Does not touch ABV fields directly
/// — callers pass `abv_update` only when the categorization table (§4.4.2)
/// calls for one.
pub async fn record_cleanup(
    pool: &AnyPool,
    beer_id: &str,
    cleaned: Option<&str>,
    cleaned_at: i64,
    cleanup_source: Option<CleanupSource>,
    abv_update: Option<(f64, EnrichmentSource, f64)>,
) -> anyhow::Result<()> {
    match abv_update {
        Some((abv, source, confidence)) => {
            sqlx::query(
                r#"
UPDATE enriched_beers
SET brew_description_cleaned = ?, description_cleaned_at = ?, cleanup_source = ?,
    abv = ?, enrichment_source = ?, confidence = ?, updated_at = ?
WHERE id = ? AND (enrichment_source IS NULL OR enrichment_source != 'perplexity');
"#,
            )
            .bind(cleaned)
            .bind(cleaned_at)
            .bind(cleanup_source.map(|s| s.as_str()))
            .bind(abv)
            .bind(source.as_str())
            .bind(confidence)
            .bind(now_ms() as i64)
            .bind(beer_id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
UPDATE enriched_beers
SET brew_description_cleaned = ?, description_cleaned_at = ?, cleanup_source = ?, updated_at = ?
WHERE id = ?;
"#,
            )
            .bind(cleaned)
            .bind(cleaned_at)
            .bind(cleanup_source.map(|s| s.as_str()))
            .bind(now_ms() as i64)
            .bind(beer_id)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

pub async fn get_beer(pool: &AnyPool, beer_id: &str) -> anyhow::Result<Option<Beer>> {
    let row = sqlx::query(
        r#"
SELECT id, brew_name, brewer, brew_description, description_hash,
  brew_description_cleaned, description_cleaned_at, cleanup_source,
  abv, confidence, enrichment_source, enrichment_status,
  last_seen_at, updated_at, extra
FROM enriched_beers WHERE id = ?;
"#,
    )
    .bind(beer_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_beer).transpose()
}

/// Beers with no ABV yet, optionally excluding those currently pending in the
/// DLQ (§4.8 step 5).
pub async fn select_unenriched(
    pool: &AnyPool,
    limit: i64,
    exclude_dlq_pending: bool,
) -> anyhow::Result<Vec<String>> {
    let rows = if exclude_dlq_pending {
        sqlx::query(
            r#"
SELECT id FROM enriched_beers
WHERE abv IS NULL
  AND id NOT IN (SELECT beer_id FROM dlq_messages WHERE status = 'pending')
LIMIT ?;
"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(r#"SELECT id FROM enriched_beers WHERE abv IS NULL LIMIT ?;"#)
            .bind(limit)
            .fetch_all(pool)
            .await?
    };

    Ok(rows.iter().map(|r| r.get::<String, _>("id")).collect())
}

fn row_to_beer(r: &sqlx::any::AnyRow) -> anyhow::Result<Beer> {
    let cleanup_source: Option<String> = r.get("cleanup_source");
    let enrichment_source: Option<String> = r.get("enrichment_source");
    let extra_raw: String = r.get("extra");

    Ok(Beer {
        id: r.get("id"),
        brew_name: r.get("brew_name"),
        brewer: r.get("brewer"),
        brew_description: r.get("brew_description"),
        description_hash: r.get("description_hash"),
        brew_description_cleaned: r.get("brew_description_cleaned"),
        description_cleaned_at: r.get("description_cleaned_at"),
        cleanup_source: cleanup_source.as_deref().and_then(CleanupSource::parse),
        abv: r.get("abv"),
        confidence: r.get("confidence"),
        enrichment_source: enrichment_source.as_deref().and_then(EnrichmentSource::parse),
        enrichment_status: EnrichmentStatus::parse(&r.get::<String, _>("enrichment_status")),
        last_seen_at: r.get("last_seen_at"),
        updated_at: r.get("updated_at"),
        extra: serde_json::from_str(&extra_raw).unwrap_or(serde_json::Value::Null),
    })
}
