/// Process-wide configuration, loaded once at startup from the environment
/// (§6 Configuration). Credentials/endpoints are treated as opaque strings —
/// this crate never interprets them, only threads them to the out-of-scope
/// HTTP clients.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string (sqlite-class backend).
    pub database_url: String,

    /// CORS origin enforced by the (out-of-scope) router. Required non-empty.
    pub allowed_origin: String,

    // =========================
    // Admission
    // =========================
    /// Requests per minute admitted per rate-limit key.
    pub rate_limit_rpm: u32,

    // =========================
    // Quota
    // =========================
    pub daily_enrichment_limit: i64,
    pub monthly_enrichment_limit: i64,
    pub daily_cleanup_limit: i64,

    // =========================
    // Cleanup pipeline
    // =========================
    /// Bounded-parallel worker count for the AI cleanup pass.
    pub max_cleanup_concurrency: usize,
    /// Per-call LLM cleanup timeout.
    pub cleanup_timeout: std::time::Duration,
    /// Max attempts for the cleanup batch DB write, with exponential backoff.
    pub db_retry_attempts: u32,
    pub db_retry_base_delay: std::time::Duration,

    // =========================
    // Enrichment pipeline
    // =========================
    pub enrichment_enabled: bool,
    /// Fixed inter-call delay before each upstream ABV lookup (skipped on the first message).
    pub enrichment_pacing_delay: std::time::Duration,
    /// Delay applied when the upstream error looks like an HTTP 429.
    pub enrichment_rate_limit_retry_delay: std::time::Duration,

    // =========================
    // Circuit breaker
    // =========================
    pub breaker_slow_call_limit: u32,
    pub breaker_slow_threshold: std::time::Duration,
    pub breaker_reset_after: std::time::Duration,

    // =========================
    // DLQ
    // =========================
    pub dlq_purge_batch_limit: i64,
    pub dlq_purge_older_than: chrono::Duration,

    // =========================
    // Credentials / endpoints (opaque)
    // =========================
    pub api_key: String,
    pub admin_secret: String,
    pub perplexity_api_key: String,
    pub flying_saucer_api_base: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let allowed_origin = std::env::var("ALLOWED_ORIGIN").unwrap_or_default();
        if allowed_origin.trim().is_empty() {
            anyhow::bail!("ALLOWED_ORIGIN must be set to a non-empty CORS origin");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://pipeline_dev.db".to_string()),
            allowed_origin,

            rate_limit_rpm: env_u32("RATE_LIMIT_RPM", 60),

            daily_enrichment_limit: env_i64("DAILY_ENRICHMENT_LIMIT", 500),
            monthly_enrichment_limit: env_i64("MONTHLY_ENRICHMENT_LIMIT", 2_000),
            daily_cleanup_limit: env_i64("DAILY_CLEANUP_LIMIT", 1_000),

            max_cleanup_concurrency: env_u32("MAX_CLEANUP_CONCURRENCY", 10) as usize,
            cleanup_timeout: std::time::Duration::from_secs(10),
            db_retry_attempts: 3,
            db_retry_base_delay: std::time::Duration::from_millis(100),

            enrichment_enabled: std::env::var("ENRICHMENT_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
            enrichment_pacing_delay: std::time::Duration::from_secs(2),
            enrichment_rate_limit_retry_delay: std::time::Duration::from_secs(120),

            breaker_slow_call_limit: 3,
            breaker_slow_threshold: std::time::Duration::from_millis(5_000),
            breaker_reset_after: std::time::Duration::from_millis(60_000),

            dlq_purge_batch_limit: 1_000,
            dlq_purge_older_than: chrono::Duration::days(30),

            api_key: std::env::var("API_KEY").unwrap_or_default(),
            admin_secret: std::env::var("ADMIN_SECRET").unwrap_or_default(),
            perplexity_api_key: std::env::var("PERPLEXITY_API_KEY").unwrap_or_default(),
            flying_saucer_api_base: std::env::var("FLYING_SAUCER_API_BASE").unwrap_or_default(),
        })
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
