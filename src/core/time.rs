//! Shared timestamp and date helpers.

use chrono::{NaiveDate, SecondsFormat, Utc};
use ulid::Ulid;

/// RFC 3339 timestamp in UTC with second precision (e.g. `2026-03-01T10:00:00Z`).
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Identifier attached to one validation run in logs.
pub fn new_run_id() -> String {
    Ulid::new().to_string()
}

/// Parses `YYYY-MM-DD`, also accepting a full RFC 3339 timestamp.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_rfc3339_is_utc() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn run_ids_are_unique_ulids() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert!(Ulid::from_string(&a).is_ok());
    }

    #[test]
    fn parses_dates_and_timestamps() {
        assert_eq!(
            parse_iso_date("2020-01-01"),
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert_eq!(
            parse_iso_date("2026-05-04T12:00:00Z"),
            NaiveDate::from_ymd_opt(2026, 5, 4)
        );
        assert_eq!(parse_iso_date("next tuesday"), None);
        assert_eq!(parse_iso_date("2026-13-01"), None);
    }
}
