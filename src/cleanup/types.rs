use std::time::Duration;

/// Inbound cleanup queue message (§6).
#[derive(Clone, Debug)]
pub struct CleanupMessage {
    pub beer_id: String,
    pub beer_name: String,
    pub brewer: String,
    pub brew_description: String,
}

/// What the LLM cleanup client returns over the wire (`.response` field, §6).
#[derive(Clone, Debug)]
pub struct LlmCleanupResult {
    pub response: String,
}

/// Outcome of the validated cleanup attempt (§4.4.1).
#[derive(Clone, Debug, PartialEq)]
pub struct CleanedDescription {
    pub cleaned: String,
    pub used_original: bool,
    pub extracted_abv: Option<f64>,
}

/// Result of one AI cleanup call, before categorization (§9 design notes).
#[derive(Clone, Debug)]
pub enum AiResult {
    Success {
        cleaned: CleanedDescription,
        latency: Duration,
    },
    /// Breaker was open; regex-only fallback was used instead of the LLM.
    Fallback {
        cleaned: CleanedDescription,
        latency: Option<Duration>,
    },
    Failure {
        error: String,
        latency: Option<Duration>,
    },
}

/// One of the five outcomes of §4.4.2's categorization table.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    SuccessWithAbv { abv: f64 },
    SuccessNoAbv,
    FallbackWithAbv { abv: f64, quota_exceeded: bool },
    FallbackNoAbv { quota_exceeded: bool },
    Failure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry,
}
