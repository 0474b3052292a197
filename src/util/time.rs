//! Time utilities

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Current unix timestamp in seconds, used for `last_event` / `last_skill_change`
pub fn unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parse a Source-engine log stamp `MM/DD/YYYY - HH:MM:SS` as local civil time.
///
/// Returns `None` if the stamp doesn't match, in which case callers fall back to "now".
pub fn parse_log_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(stamp, "%m/%d/%Y - %H:%M:%S").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_stamp() {
        let ts = parse_log_timestamp("10/18/2023 - 20:15:22").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-10-18 20:15:22");
    }

    #[test]
    fn rejects_malformed_stamp() {
        assert!(parse_log_timestamp("not a date").is_none());
    }
}
