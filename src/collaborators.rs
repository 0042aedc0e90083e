//! Trait interfaces for every component the core treats as an external
//! collaborator (§1 scope, §6 external interfaces, §9 design notes). No
//! module-scope singleton is required to wire them — callers construct
//! implementations and pass them in, the way the teacher's `SwapExecutor`
//! and `SessionRepository` traits are injected rather than looked up.

use async_trait::async_trait;

use crate::cleanup::types::{CleanupMessage, LlmCleanupResult};
use crate::enrichment::types::EnrichmentMessage;

/// The LLM used to normalize a raw description (§4.4.1, §6 LLM cleanup).
#[async_trait]
pub trait LlmCleanupClient: Send + Sync {
    async fn clean(&self, message: &CleanupMessage) -> anyhow::Result<LlmCleanupResult>;
}

/// The LLM-with-search ABV lookup provider (§4.5 step 6, §6 LLM ABV lookup).
#[async_trait]
pub trait LlmAbvClient: Send + Sync {
    /// Returns the raw textual content (`choices[0].message.content` on the
    /// wire); the caller parses the first numeric token or `"unknown"`.
    /// Implementations must make an HTTP 429 detectable via
    /// `error.to_string().contains("429")`.
    async fn lookup_abv(&self, beer_name: &str, brewer: &str) -> anyhow::Result<String>;
}

/// Producer side of the cleanup/enrichment/DLQ queues. The core never
/// depends on a specific broker — only this interface.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    async fn send_enrichment(&self, messages: &[EnrichmentMessage]) -> anyhow::Result<()>;
    async fn send_cleanup(&self, messages: &[CleanupMessage]) -> anyhow::Result<()>;
    async fn send_dlq_replay(
        &self,
        source_queue: &str,
        raw_message: &str,
        delay_seconds: u32,
    ) -> anyhow::Result<()>;
}

/// Append-only audit trail, out of scope per §1 but still a narrow
/// interface the core writes through.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: &str, detail: serde_json::Value) -> anyhow::Result<()>;
}

/// Analytics event emission, out of scope per §1.
#[async_trait]
pub trait AnalyticsEmitter: Send + Sync {
    async fn emit(&self, event: &str, detail: serde_json::Value);
}

/// Upstream taplist HTTP client (§6). Returns the beer records found on the
/// `brewInStock` array; unknown fields on each record are preserved in
/// `extra` for response merging.
#[async_trait]
pub trait TaplistClient: Send + Sync {
    async fn fetch_taplist(&self, store_id: &str) -> anyhow::Result<Vec<TaplistBeer>>;
}

#[derive(Clone, Debug)]
pub struct TaplistBeer {
    pub id: String,
    pub brew_name: String,
    pub brewer: Option<String>,
    pub brew_description: Option<String>,
    pub extra: serde_json::Value,
}
