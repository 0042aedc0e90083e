use thiserror::Error;

/// User-facing error taxonomy (§7). Each variant maps to one wire error code;
/// the `Display` text is what a client may see, so it must never leak vendor
/// details (SQL text, stack traces, upstream bodies).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("enrichment is disabled")]
    KillSwitched,

    #[error("upstream request failed")]
    UpstreamError,

    #[error("store unavailable")]
    DbUnavailable,

    #[error("internal error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable code for the `{success:false, error:{code}}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            AppError::KillSwitched => "KILL_SWITCHED",
            AppError::UpstreamError => "UPSTREAM_ERROR",
            AppError::DbUnavailable => "DB_UNAVAILABLE",
            AppError::Internal => "INTERNAL",
        }
    }
}
