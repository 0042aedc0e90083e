//! The enrichment pipeline (§4.5): per-message ABV lookup against the
//! monthly/daily quota ceilings, paced to respect the upstream provider.

pub mod types;

use std::sync::Arc;

use crate::collaborators::LlmAbvClient;
use crate::config::AppConfig;
use crate::store::beer::{EnrichmentSource, EnrichmentStatus};
use crate::store::quota::QuotaScope;
use crate::store::Store;
use crate::time::today_utc;

pub use types::{Disposition, EnrichmentMessage};

/// Plausible ABV range accepted from the upstream lookup (§4.5 step 7).
const ABV_RANGE: std::ops::RangeInclusive<f64> = 0.0..=70.0;

/// Confidence stamped on a Perplexity-sourced ABV.
const PERPLEXITY_CONFIDENCE: f64 = 0.7;

/// Default retry delay for upstream failures that are not rate-limit errors.
const DEFAULT_RETRY_SECONDS: u32 = 30;

pub struct EnrichmentPipeline {
    store: Store,
    abv_client: Arc<dyn LlmAbvClient>,
    config: AppConfig,
}

impl EnrichmentPipeline {
    pub fn new(store: Store, abv_client: Arc<dyn LlmAbvClient>, config: AppConfig) -> Self {
        Self { store, abv_client, config }
    }

    /// Runs the §4.5 flow for a single inbound message. `is_first_in_batch`
    /// lets the consumer loop skip the pacing delay for the first message of
    /// a drained batch, matching the original queue-consumer behaviour.
    pub async fn run_message(&self, msg: &EnrichmentMessage, is_first_in_batch: bool) -> Disposition {
        // Step 1: kill switch.
        if !self.config.enrichment_enabled {
            return Disposition::Ack;
        }

        // Step 2: status guard — only a pending, known beer is eligible.
        let beer = match self.store.get_beer(&msg.beer_id).await {
            Ok(Some(b)) => b,
            Ok(None) => return Disposition::Ack,
            Err(err) => {
                tracing::error!(error = %err, beer_id = %msg.beer_id, "failed to load beer for enrichment");
                return Disposition::RetryAfter(DEFAULT_RETRY_SECONDS);
            }
        };
        if beer.enrichment_status != EnrichmentStatus::Pending {
            return Disposition::Ack;
        }

        // Step 3: monthly ceiling, read-only.
        let today = today_utc();
        match self.store.month_sum(QuotaScope::Enrichment, &today).await {
            Ok(sum) if sum >= self.config.monthly_enrichment_limit => {
                self.mark_skipped(&msg.beer_id).await;
                return Disposition::Ack;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to read monthly enrichment quota");
                return Disposition::RetryAfter(DEFAULT_RETRY_SECONDS);
            }
            _ => {}
        }

        // Step 4: atomic daily slot reservation.
        let slot = match self
            .store
            .reserve_slot(QuotaScope::Enrichment, self.config.daily_enrichment_limit)
            .await
        {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(error = %err, "failed to reserve enrichment slot");
                return Disposition::RetryAfter(DEFAULT_RETRY_SECONDS);
            }
        };
        if !slot.reserved {
            self.mark_skipped(&msg.beer_id).await;
            return Disposition::Ack;
        }

        // Step 5: pacing delay, skipped for the first message of a batch.
        if !is_first_in_batch {
            tokio::time::sleep(self.config.enrichment_pacing_delay).await;
        }

        // Step 6: upstream call.
        let lookup = self.abv_client.lookup_abv(&msg.beer_name, &msg.brewer).await;

        match lookup {
            Ok(raw) => {
                // Step 7: parse the first numeric token, or treat as not found.
                let parsed = parse_first_number(&raw).filter(|v| ABV_RANGE.contains(v));
                match parsed {
                    Some(abv) => {
                        if let Err(err) = self
                            .store
                            .update_enrichment(
                                &msg.beer_id,
                                Some(abv),
                                Some(EnrichmentSource::Perplexity),
                                Some(PERPLEXITY_CONFIDENCE),
                                EnrichmentStatus::Enriched,
                            )
                            .await
                        {
                            tracing::error!(error = %err, beer_id = %msg.beer_id, "failed to persist enrichment result");
                            return Disposition::RetryAfter(DEFAULT_RETRY_SECONDS);
                        }
                    }
                    None => {
                        if let Err(err) = self
                            .store
                            .update_enrichment(&msg.beer_id, None, None, None, EnrichmentStatus::NotFound)
                            .await
                        {
                            tracing::error!(error = %err, beer_id = %msg.beer_id, "failed to persist not-found result");
                            return Disposition::RetryAfter(DEFAULT_RETRY_SECONDS);
                        }
                    }
                }
                Disposition::Ack
            }
            // Step 8: error policy. The reserved slot stays consumed either
            // way — upstream providers bill per call attempted, not per
            // successful parse.
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(error = %message, beer_id = %msg.beer_id, "enrichment upstream call failed");
                if message.contains("429") {
                    Disposition::RetryAfter(self.config.enrichment_rate_limit_retry_delay.as_secs() as u32)
                } else {
                    Disposition::RetryAfter(DEFAULT_RETRY_SECONDS)
                }
            }
        }
    }

    async fn mark_skipped(&self, beer_id: &str) {
        if let Err(err) = self
            .store
            .update_enrichment(beer_id, None, None, None, EnrichmentStatus::Skipped)
            .await
        {
            tracing::error!(error = %err, beer_id, "failed to mark beer as skipped");
        }
    }
}

fn parse_first_number(text: &str) -> Option<f64> {
    let mut token = String::new();
    let mut seen_digit = false;
    for c in text.chars() {
        if c.is_ascii_digit() || (c == '.' && !token.contains('.')) {
            token.push(c);
            seen_digit |= c.is_ascii_digit();
        } else if seen_digit {
            break;
        }
    }
    if seen_digit { token.parse().ok() } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_number_out_of_free_text() {
        assert_eq!(parse_first_number("6.2"), Some(6.2));
        assert_eq!(parse_first_number("ABV is about 6.2 percent"), Some(6.2));
        assert_eq!(parse_first_number("unknown"), None);
    }
}
