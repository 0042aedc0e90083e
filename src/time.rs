//! Millisecond time helpers and UTC date arithmetic for quota windows.
//!
//! All timestamps in this crate are milliseconds since the Unix epoch unless
//! otherwise noted; all quota-counter dates are UTC `YYYY-MM-DD` strings.

use chrono::{Datelike, NaiveDate, Utc};

pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// `⌊now/60000⌋` — the fixed-window minute bucket used by the admission layer.
pub fn minute_bucket(now_ms: u64) -> i64 {
    (now_ms / 60_000) as i64
}

pub fn bucket_reset_at(bucket: i64) -> u64 {
    ((bucket + 1) * 60_000) as u64
}

/// Today's date as `YYYY-MM-DD`, UTC.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// The first and last day (inclusive) of the UTC month containing `date`,
/// both as `YYYY-MM-DD`. Never computes a literal `-31`; derives the last day
/// by stepping into the following month and subtracting one day.
pub fn month_range_utc(date: &str) -> anyhow::Result<(String, String)> {
    let d = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date {date}: {e}"))?;
    let first = d
        .with_day(1)
        .ok_or_else(|| anyhow::anyhow!("could not compute first of month for {date}"))?;

    let (next_year, next_month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| anyhow::anyhow!("could not compute next month for {date}"))?;
    let last = first_of_next
        .pred_opt()
        .ok_or_else(|| anyhow::anyhow!("could not compute last day of month for {date}"))?;

    Ok((first.format("%Y-%m-%d").to_string(), last.format("%Y-%m-%d").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_bucket_and_reset_are_consistent() {
        let now = 1_700_000_123_456u64;
        let bucket = minute_bucket(now);
        let reset = bucket_reset_at(bucket);
        assert!(reset > now);
        assert_eq!(reset - (now - now % 60_000), 60_000);
    }

    #[test]
    fn month_range_handles_february_leap_year() {
        let (first, last) = month_range_utc("2024-02-10").unwrap();
        assert_eq!(first, "2024-02-01");
        assert_eq!(last, "2024-02-29");
    }

    #[test]
    fn month_range_handles_december_year_rollover() {
        let (first, last) = month_range_utc("2025-12-15").unwrap();
        assert_eq!(first, "2025-12-01");
        assert_eq!(last, "2025-12-31");
    }

    #[test]
    fn month_range_never_uses_fixed_31_for_short_months() {
        let (_, last) = month_range_utc("2025-04-05").unwrap();
        assert_eq!(last, "2025-04-30");
    }
}
