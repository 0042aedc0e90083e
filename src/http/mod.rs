//! Thin translation layer between the wire and the core operations (§6).
//! No HTTP framework lives here — the out-of-scope router owns request
//! parsing, CORS, and auth; these functions take already-parsed parameters
//! and return typed results the router serializes (or maps to a status code
//! via [`crate::error::AppError`]).

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::admin::{AdminOrchestrator, SkipReason, TriggerOutcome};
use crate::collaborators::TaplistClient;
use crate::config::AppConfig;
use crate::dlq::DlqOrchestrator;
use crate::error::AppError;
use crate::store::beer::BeerUpsert;
use crate::store::dlq::{DlqCursor, ListDlqParams};
use crate::store::quota::QuotaScope;
use crate::store::Store;
use crate::time::today_utc;

use types::*;

const MAX_BATCH_IDS: usize = 100;
const MAX_DLQ_LIST_LIMIT: i64 = 100;

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// `GET /beers?sid=<store>` — fetch-and-merge (§6).
pub async fn get_beers(
    store: &Store,
    taplist: &Arc<dyn TaplistClient>,
    sid: &str,
    allowed_store_ids: &[String],
) -> Result<BeersResponse, AppError> {
    if sid.is_empty() || !allowed_store_ids.iter().any(|a| a == sid) {
        return Err(AppError::InvalidRequest("sid missing or not recognized".to_string()));
    }

    let taplist_beers = taplist.fetch_taplist(sid).await.map_err(|err| {
        tracing::warn!(error = %err, sid, "upstream taplist fetch failed");
        AppError::UpstreamError
    })?;

    let mut beers = Vec::with_capacity(taplist_beers.len());
    for t in taplist_beers {
        let description_hash = t
            .brew_description
            .as_deref()
            .map(crate::cleanup::validate::hash_description);
        let extracted_abv = t.brew_description.as_deref().and_then(crate::cleanup::validate::extract_abv);

        let beer = store
            .upsert_beer(&BeerUpsert {
                id: t.id,
                brew_name: t.brew_name,
                brewer: t.brewer.unwrap_or_default(),
                brew_description: t.brew_description,
                description_hash,
                extracted_abv,
                extra: t.extra,
            })
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "failed to upsert beer during taplist merge");
                AppError::DbUnavailable
            })?;

        beers.push(BeerView {
            id: beer.id,
            brew_name: beer.brew_name,
            brewer: beer.brewer,
            abv: beer.abv,
            confidence: beer.confidence,
            enrichment_source: beer.enrichment_source.map(|s| s.as_str().to_string()),
            extra: beer.extra,
        });
    }

    Ok(BeersResponse { beers, store_id: sid.to_string(), request_id: new_request_id() })
}

/// `POST /beers/batch {ids: [string]}` — bounded to 100 ids (§6).
pub async fn batch_enrichments(store: &Store, ids: &[String]) -> Result<BatchResponse, AppError> {
    if ids.is_empty() || ids.len() > MAX_BATCH_IDS {
        return Err(AppError::InvalidRequest(format!("ids must contain 1..={MAX_BATCH_IDS} entries")));
    }

    let mut enrichments = HashMap::with_capacity(ids.len());
    for id in ids {
        let beer = store.get_beer(id).await.map_err(|err| {
            tracing::error!(error = %err, beer_id = %id, "failed to load beer for batch lookup");
            AppError::DbUnavailable
        })?;
        let view = match beer {
            Some(b) => EnrichmentView {
                abv: b.abv,
                confidence: b.confidence,
                source: b.enrichment_source.map(|s| s.as_str().to_string()),
                is_verified: b.enrichment_source == Some(crate::store::beer::EnrichmentSource::Perplexity),
            },
            None => EnrichmentView { abv: None, confidence: None, source: None, is_verified: false },
        };
        enrichments.insert(id.clone(), view);
    }

    Ok(BatchResponse { enrichments, request_id: new_request_id() })
}

pub struct DlqListQuery<'a> {
    pub status: Option<&'a str>,
    pub beer_id: Option<&'a str>,
    pub limit: i64,
    pub cursor: Option<&'a str>,
    pub include_raw: bool,
}

/// `GET /admin/dlq` (§6). Cursor decode failure is reported with the
/// dedicated `INVALID_CURSOR` code, distinct from the generic
/// `invalid_request` taxonomy entry.
pub async fn admin_list_dlq(dlq: &DlqOrchestrator, query: DlqListQuery<'_>) -> Result<DlqListResponse, ErrorEnvelope> {
    let request_id = new_request_id();
    let limit = query.limit.clamp(1, MAX_DLQ_LIST_LIMIT);

    let cursor = match query.cursor {
        Some(raw) => match DlqCursor::decode(raw) {
            Ok(c) => Some(c),
            Err(_) => {
                return Err(ErrorEnvelope {
                    success: false,
                    error: ErrorBody { message: "invalid cursor".to_string(), code: "INVALID_CURSOR" },
                    request_id,
                });
            }
        },
        None => None,
    };

    let page = dlq
        .list(ListDlqParams { status: query.status, beer_id: query.beer_id, cursor, limit })
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "dlq list failed");
            ErrorEnvelope::from_app_error(&AppError::DbUnavailable, &request_id)
        })?;

    let has_more = page.has_more;
    let next_cursor = if has_more {
        page.items.last().map(|last| DlqCursor { failed_at: last.failed_at, id: last.id }.encode())
    } else {
        None
    };

    Ok(DlqListResponse {
        items: page
            .items
            .into_iter()
            .map(|m| DlqItemView {
                id: m.id,
                message_id: m.message_id,
                beer_id: m.beer_id,
                beer_name: m.beer_name,
                brewer: m.brewer,
                failed_at: m.failed_at,
                failure_count: m.failure_count,
                status: m.status,
                replay_count: m.replay_count,
                raw_message: if query.include_raw { Some(m.raw_message) } else { None },
            })
            .collect(),
        has_more,
        next_cursor,
        request_id,
    })
}

/// `GET /admin/dlq/stats` (§6).
pub async fn admin_dlq_stats(dlq: &DlqOrchestrator) -> Result<DlqStatsResponse, AppError> {
    let stats = dlq.stats().await.map_err(|err| {
        tracing::error!(error = %err, "dlq stats failed");
        AppError::DbUnavailable
    })?;

    Ok(DlqStatsResponse {
        counts_by_status: stats.counts_by_status,
        oldest_pending_age_ms: stats.oldest_pending_age_ms,
        top_failing_brewers: stats.top_failing_brewers,
        last_24h_count: stats.last_24h_count,
        most_replayed_beers: stats.most_replayed_beers,
        request_id: new_request_id(),
    })
}

/// `POST /admin/dlq/replay {ids[], delay_seconds?}` (§6).
pub async fn admin_replay_dlq(dlq: &DlqOrchestrator, ids: &[i64], delay_seconds: i64) -> Result<DlqReplayResponse, AppError> {
    if ids.is_empty() {
        return Err(AppError::InvalidRequest("ids must not be empty".to_string()));
    }

    let outcome = dlq.replay(ids, delay_seconds).await.map_err(|err| {
        tracing::error!(error = %err, "dlq replay failed");
        AppError::DbUnavailable
    })?;

    Ok(DlqReplayResponse {
        requested_count: outcome.requested,
        claimed_count: outcome.claimed,
        replayed_count: outcome.enqueued,
        failed_count: outcome.rolled_back,
        request_id: new_request_id(),
    })
}

/// `POST /admin/dlq/acknowledge {ids[]}` (§6).
pub async fn admin_acknowledge_dlq(dlq: &DlqOrchestrator, ids: &[i64]) -> Result<DlqAcknowledgeResponse, AppError> {
    if ids.is_empty() {
        return Err(AppError::InvalidRequest("ids must not be empty".to_string()));
    }

    let acknowledged_count = dlq.acknowledge(ids).await.map_err(|err| {
        tracing::error!(error = %err, "dlq acknowledge failed");
        AppError::DbUnavailable
    })?;

    Ok(DlqAcknowledgeResponse { acknowledged_count, request_id: new_request_id() })
}

/// `POST /admin/enrich/trigger {limit?, exclude_failures?}` (§4.8, §6).
pub async fn admin_trigger_enrichment(
    admin: &AdminOrchestrator,
    limit: i64,
    exclude_failures: bool,
) -> Result<TriggerResponse, AppError> {
    let outcome = admin.trigger(limit, exclude_failures).await.map_err(|err| {
        tracing::error!(error = %err, "admin trigger failed");
        AppError::DbUnavailable
    })?;

    let response = match outcome {
        TriggerOutcome::Skipped(reason) => TriggerResponse {
            skip_reason: Some(skip_reason_code(&reason)),
            beers_queued: 0,
            request_id: new_request_id(),
        },
        TriggerOutcome::Enqueued { beer_ids } => {
            TriggerResponse { skip_reason: None, beers_queued: beer_ids.len(), request_id: new_request_id() }
        }
    };
    Ok(response)
}

fn skip_reason_code(reason: &SkipReason) -> &'static str {
    match reason {
        SkipReason::KillSwitched => "kill_switch",
        SkipReason::MonthlyLimitReached => "monthly_limit",
        SkipReason::DailyLimitReached => "daily_limit",
        SkipReason::NoEligibleBeers => "no_eligible_beers",
    }
}

/// `GET /health` — connectivity probe plus quota snapshot (§6).
pub async fn health(store: &Store, config: &AppConfig) -> Result<HealthResponse, AppError> {
    let today = today_utc();
    let daily_enrichment_used = store.today_count(QuotaScope::Enrichment).await.map_err(|_| AppError::DbUnavailable)?;
    let monthly_enrichment_used = store
        .month_sum(QuotaScope::Enrichment, &today)
        .await
        .map_err(|_| AppError::DbUnavailable)?;
    let daily_cleanup_used = store.today_count(QuotaScope::Cleanup).await.map_err(|_| AppError::DbUnavailable)?;

    let _ = config;
    Ok(HealthResponse {
        ok: true,
        daily_enrichment_used,
        monthly_enrichment_used,
        daily_cleanup_used,
        request_id: new_request_id(),
    })
}
