//! Wire DTOs for the (out-of-scope) HTTP router to serialize. These are pure
//! data — no framework types leak in here (§1: the router itself is an
//! external collaborator).

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Debug)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
}

impl ErrorEnvelope {
    pub fn from_app_error(err: &crate::error::AppError, request_id: &str) -> Self {
        Self {
            success: false,
            error: ErrorBody { message: err.to_string(), code: err.code() },
            request_id: request_id.to_string(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct BeerView {
    pub id: String,
    pub brew_name: String,
    pub brewer: String,
    pub abv: Option<f64>,
    pub confidence: Option<f64>,
    pub enrichment_source: Option<String>,
    pub extra: Value,
}

#[derive(Serialize, Debug)]
pub struct BeersResponse {
    pub beers: Vec<BeerView>,
    pub store_id: String,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct EnrichmentView {
    pub abv: Option<f64>,
    pub confidence: Option<f64>,
    pub source: Option<String>,
    pub is_verified: bool,
}

#[derive(Serialize, Debug)]
pub struct BatchResponse {
    pub enrichments: std::collections::HashMap<String, EnrichmentView>,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct DlqItemView {
    pub id: i64,
    pub message_id: String,
    pub beer_id: String,
    pub beer_name: String,
    pub brewer: String,
    pub failed_at: i64,
    pub failure_count: i32,
    pub status: String,
    pub replay_count: i32,
    pub raw_message: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct DlqListResponse {
    pub items: Vec<DlqItemView>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct DlqStatsResponse {
    pub counts_by_status: Vec<(String, i64)>,
    pub oldest_pending_age_ms: Option<i64>,
    pub top_failing_brewers: Vec<(String, i64)>,
    pub last_24h_count: i64,
    pub most_replayed_beers: Vec<(String, i32)>,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct DlqReplayResponse {
    pub requested_count: usize,
    pub claimed_count: u64,
    pub replayed_count: u64,
    pub failed_count: u64,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct DlqAcknowledgeResponse {
    pub acknowledged_count: u64,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct TriggerResponse {
    pub skip_reason: Option<&'static str>,
    pub beers_queued: usize,
    pub request_id: String,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub ok: bool,
    pub daily_enrichment_used: i64,
    pub monthly_enrichment_used: i64,
    pub daily_cleanup_used: i64,
    pub request_id: String,
}
