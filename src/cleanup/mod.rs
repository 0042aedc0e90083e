//! The cleanup pipeline (§4.4): quota reservation, bounded-parallel AI
//! normalization gated by the circuit breaker, categorization, and the
//! atomic batch write back to the store.

pub mod types;
pub mod validate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::breaker::CircuitBreaker;
use crate::collaborators::{LlmCleanupClient, QueueProducer};
use crate::config::AppConfig;
use crate::store::beer::{CleanupSource, EnrichmentSource, EnrichmentStatus};
use crate::store::quota::QuotaScope;
use crate::store::Store;
use crate::time::now_ms;

use types::{AiResult, CleanedDescription, CleanupMessage, Disposition, Outcome};
use validate::clean_description_safely;

pub struct CleanupPipeline {
    store: Store,
    breaker: Arc<CircuitBreaker>,
    llm: Arc<dyn LlmCleanupClient>,
    queue: Arc<dyn QueueProducer>,
    config: AppConfig,
}

/// Per-message result of one `run_batch` call, enough for the caller (the
/// queue consumer) to decide whether to ack or retry the inbound message.
pub struct CleanupResult {
    pub beer_id: String,
    pub outcome: Outcome,
    pub disposition: Disposition,
}

impl CleanupPipeline {
    pub fn new(
        store: Store,
        breaker: Arc<CircuitBreaker>,
        llm: Arc<dyn LlmCleanupClient>,
        queue: Arc<dyn QueueProducer>,
        config: AppConfig,
    ) -> Self {
        Self { store, breaker, llm, queue, config }
    }

    /// Runs the full §4.4 flow over one batch of inbound cleanup messages.
    pub async fn run_batch(&self, messages: Vec<CleanupMessage>) -> Vec<CleanupResult> {
        if messages.is_empty() {
            return Vec::new();
        }

        // Phase 1: quota reservation (all-or-nothing, §4.3). A reservation
        // error (as opposed to a clean "not enough quota" result) must retry
        // the whole batch rather than consume it through the fallback path.
        let reservation = match self
            .store
            .reserve_batch(QuotaScope::Cleanup, messages.len() as i64, self.config.daily_cleanup_limit)
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::error!(error = %err, "cleanup quota reservation failed");
                return messages
                    .into_iter()
                    .map(|m| CleanupResult { beer_id: m.beer_id, outcome: Outcome::Failure, disposition: Disposition::Retry })
                    .collect();
            }
        };
        let quota_exceeded = reservation.reserved < messages.len() as i64;

        // Phase 2/3: per-message AI pass, bounded-parallel, breaker-gated.
        let ai_results: Vec<(CleanupMessage, AiResult)> = if quota_exceeded {
            messages
                .into_iter()
                .map(|m| {
                    let cleaned = regex_only_fallback(&m.brew_description);
                    (m, AiResult::Fallback { cleaned, latency: None })
                })
                .collect()
        } else {
            self.run_ai_pass(messages).await
        };

        // Phase 4: categorize.
        let categorized: Vec<(CleanupMessage, Outcome, CleanedDescription)> = ai_results
            .into_iter()
            .map(|(m, ai)| {
                let (outcome, cleaned) = categorize(ai, quota_exceeded);
                (m, outcome, cleaned)
            })
            .collect();

        // Phase 5: atomic per-row DB write with retry.
        let mut results = Vec::with_capacity(categorized.len());
        let mut to_enrich = Vec::new();
        for (msg, outcome, cleaned) in categorized {
            let disposition = self.write_with_retry(&msg, &outcome, &cleaned).await;
            if matches!(
                outcome,
                Outcome::SuccessWithAbv { .. } | Outcome::FallbackWithAbv { .. }
            ) && disposition == Disposition::Ack
            {
                to_enrich.push(crate::enrichment::types::EnrichmentMessage {
                    beer_id: msg.beer_id.clone(),
                    beer_name: msg.beer_name.clone(),
                    brewer: msg.brewer.clone(),
                });
            }
            results.push(CleanupResult { beer_id: msg.beer_id, outcome, disposition });
        }

        // Phase 6: single-batch enrichment emission, log-and-continue on failure.
        if !to_enrich.is_empty() {
            if let Err(err) = self.queue.send_enrichment(&to_enrich).await {
                tracing::warn!(error = %err, count = to_enrich.len(), "failed to enqueue enrichment batch");
            }
        }

        results
    }

    async fn run_ai_pass(&self, messages: Vec<CleanupMessage>) -> Vec<(CleanupMessage, AiResult)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_cleanup_concurrency.max(1)));
        let total = messages.len();
        let mut set = tokio::task::JoinSet::new();

        for (index, msg) in messages.into_iter().enumerate() {
            let permit = semaphore.clone();
            let breaker = self.breaker.clone();
            let llm = self.llm.clone();
            let timeout = self.config.cleanup_timeout;

            set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");

                if breaker.is_open() {
                    let cleaned = regex_only_fallback(&msg.brew_description);
                    return (index, msg, AiResult::Fallback { cleaned, latency: None });
                }

                let started = Instant::now();
                let call = tokio::time::timeout(timeout, llm.clean(&msg)).await;
                let latency = started.elapsed();
                breaker.record_latency(latency, index, total, &msg.beer_id, 0);

                match call {
                    Ok(Ok(resp)) => {
                        let cleaned = clean_description_safely(&msg.brew_description, &resp.response);
                        (index, msg, AiResult::Success { cleaned, latency })
                    }
                    Ok(Err(err)) => (index, msg, AiResult::Failure { error: err.to_string(), latency: Some(latency) }),
                    Err(_elapsed) => {
                        (index, msg, AiResult::Failure { error: "cleanup call timed out".to_string(), latency: Some(latency) })
                    }
                }
            });
        }

        let mut ordered: Vec<Option<(CleanupMessage, AiResult)>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (index, msg, ai) = joined.expect("cleanup worker task panicked");
            ordered[index] = Some((msg, ai));
        }
        ordered.into_iter().flatten().collect()
    }

    async fn write_with_retry(
        &self,
        msg: &CleanupMessage,
        outcome: &Outcome,
        cleaned: &CleanedDescription,
    ) -> Disposition {
        let cleanup_source = match outcome {
            // A validator discard (length guard / dropped ABV) means the
            // stored text is the original, untouched description — the row
            // carries no cleanup source at all (§4.4.2, §8 scenario 2).
            Outcome::SuccessWithAbv { .. } | Outcome::SuccessNoAbv if cleaned.used_original => None,
            Outcome::SuccessWithAbv { .. } | Outcome::SuccessNoAbv => Some(CleanupSource::WorkersAi),
            Outcome::FallbackWithAbv { quota_exceeded, .. } | Outcome::FallbackNoAbv { quota_exceeded } => {
                Some(if *quota_exceeded {
                    CleanupSource::FallbackQuotaExceeded
                } else {
                    CleanupSource::FallbackCircuitBreaker
                })
            }
            Outcome::Failure => None,
        };

        if matches!(outcome, Outcome::Failure) {
            return Disposition::Retry;
        }

        let abv_update = match outcome {
            Outcome::SuccessWithAbv { abv } => Some((*abv, EnrichmentSource::Description, 0.9)),
            Outcome::FallbackWithAbv { abv, .. } => Some((*abv, EnrichmentSource::DescriptionFallback, 0.8)),
            _ => None,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .store
                .record_cleanup(&msg.beer_id, Some(&cleaned.cleaned), now_ms() as i64, cleanup_source, abv_update)
                .await;
            match result {
                Ok(()) => return Disposition::Ack,
                Err(err) if attempt >= self.config.db_retry_attempts => {
                    tracing::error!(error = %err, beer_id = %msg.beer_id, attempt, "cleanup write exhausted retries");
                    return Disposition::Retry;
                }
                Err(err) => {
                    tracing::warn!(error = %err, beer_id = %msg.beer_id, attempt, "cleanup write failed, retrying");
                    let backoff = self.config.db_retry_base_delay * 2u32.pow(attempt - 1);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn regex_only_fallback(original: &str) -> CleanedDescription {
    CleanedDescription {
        cleaned: original.to_string(),
        used_original: true,
        extracted_abv: validate::extract_abv(original),
    }
}

/// Folds one `AiResult` into the §4.4.2 five-way outcome table, also
/// returning the `CleanedDescription` chosen for persistence.
fn categorize(ai: AiResult, quota_exceeded: bool) -> (Outcome, CleanedDescription) {
    match ai {
        AiResult::Success { cleaned, .. } => {
            let outcome = match cleaned.extracted_abv {
                Some(abv) => Outcome::SuccessWithAbv { abv },
                None => Outcome::SuccessNoAbv,
            };
            (outcome, cleaned)
        }
        AiResult::Fallback { cleaned, .. } => {
            let outcome = match cleaned.extracted_abv {
                Some(abv) => Outcome::FallbackWithAbv { abv, quota_exceeded },
                None => Outcome::FallbackNoAbv { quota_exceeded },
            };
            (outcome, cleaned)
        }
        AiResult::Failure { .. } => (
            Outcome::Failure,
            CleanedDescription { cleaned: String::new(), used_original: true, extracted_abv: None },
        ),
    }
}

// Only referenced for the enrichment status mapping when a future caller
// wants to short-circuit a `not_found` write; kept here rather than in
// `store::beer` since it is purely a cleanup-pipeline concern.
#[allow(dead_code)]
fn default_enrichment_status() -> EnrichmentStatus {
    EnrichmentStatus::Pending
}
