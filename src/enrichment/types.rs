/// Inbound enrichment queue message (§6).
#[derive(Clone, Debug)]
pub struct EnrichmentMessage {
    pub beer_id: String,
    pub beer_name: String,
    pub brewer: String,
}

/// Disposition of one processed enrichment message (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Retry after the given delay, in seconds.
    RetryAfter(u32),
}
