//! No-expiry normalisation for provision validity periods.
//!
//! gICS has no way to express an open-ended validity period, so consents
//! without an expiry are reported with a far-future end date instead:
//! `3000-01-01T00:00:00` at the UTC offset of the period start.
//!
//! Downstream consumers must treat "no end" and the sentinel as equivalent.
//! The canonical form always omits the end.
//!
//! # Matching rules
//!
//! - The sentinel is built at the offset of `period.start`. When the start is
//!   missing or unparseable, the end's own offset is used.
//! - `end` must carry that offset and read `3000-01-01T00:00:00` in it.
//!   Equal instants do not count: `2999-12-31T23:00:00+01:00` next to a
//!   `+02:00` start is *not* the sentinel and is preserved.
//! - A bare date `3000-01-01` is the sentinel.
//! - Anything else is left exactly as received, including its formatting.

use chrono::{DateTime, NaiveDate};

use crate::fhir::Period;

const SENTINEL_YEAR: i32 = 3000;

/// Remove the end of `period` if it is the no-expiry sentinel.
pub fn normalize_period(period: &mut Period) {
    let is_sentinel = period
        .end
        .as_deref()
        .is_some_and(|end| is_no_expiry(period.start.as_deref(), end));
    if is_sentinel {
        period.end = None;
    }
}

/// Whether `end` is the far-future sentinel for a period starting at `start`.
pub fn is_no_expiry(start: Option<&str>, end: &str) -> bool {
    let end = end.trim();
    let Some(sentinel_date) = NaiveDate::from_ymd_opt(SENTINEL_YEAR, 1, 1) else {
        return false;
    };

    // Plain FHIR `date` values carry no offset.
    if let Ok(date) = NaiveDate::parse_from_str(end, "%Y-%m-%d") {
        return date == sentinel_date;
    }

    let Ok(end) = DateTime::parse_from_rfc3339(end) else {
        return false;
    };

    let offset = start
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|s| *s.offset())
        .unwrap_or(*end.offset());

    *end.offset() == offset
        && sentinel_date
            .and_hms_opt(0, 0, 0)
            .is_some_and(|midnight| end.naive_local() == midnight)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(start: Option<&str>, end: Option<&str>) -> Period {
        Period {
            start: start.map(String::from),
            end: end.map(String::from),
            ..Period::default()
        }
    }

    #[test]
    fn sentinel_with_matching_offset_is_removed() {
        let mut p = period(
            Some("2023-05-02T01:57:27+02:00"),
            Some("3000-01-01T00:00:00+02:00"),
        );
        normalize_period(&mut p);
        assert_eq!(p.end, None);
        assert_eq!(p.start.as_deref(), Some("2023-05-02T01:57:27+02:00"));
    }

    #[test]
    fn sentinel_in_utc() {
        let mut p = period(Some("2024-01-10T08:00:00Z"), Some("3000-01-01T00:00:00Z"));
        normalize_period(&mut p);
        assert_eq!(p.end, None);
    }

    #[test]
    fn sentinel_with_different_offset_is_kept() {
        let mut p = period(
            Some("2023-05-02T01:57:27+02:00"),
            Some("3000-01-01T00:00:00+01:00"),
        );
        normalize_period(&mut p);
        assert_eq!(p.end.as_deref(), Some("3000-01-01T00:00:00+01:00"));
    }

    #[test]
    fn missing_start_uses_end_offset() {
        let mut p = period(None, Some("3000-01-01T00:00:00+01:00"));
        normalize_period(&mut p);
        assert_eq!(p.end, None);
    }

    #[test]
    fn bare_sentinel_date() {
        assert!(is_no_expiry(Some("2023-05-02"), "3000-01-01"));
        assert!(!is_no_expiry(Some("2023-05-02"), "2999-12-31"));
    }

    #[test]
    fn real_end_dates_are_preserved() {
        let ends = [
            "2028-05-02T01:57:27+02:00",
            "3000-01-01T00:00:01+02:00",
            "3000-01-02T00:00:00+02:00",
            "2999-12-31T23:59:59+02:00",
            // Same instant as the sentinel, other offset.
            "2999-12-31T23:00:00+01:00",
            "3000-01-01T01:00:00+03:00",
        ];
        for end in ends {
            let mut p = period(Some("2023-05-02T01:57:27+02:00"), Some(end));
            normalize_period(&mut p);
            assert_eq!(p.end.as_deref(), Some(end), "end {end} should be kept");
        }
    }

    #[test]
    fn unparseable_end_is_preserved() {
        let mut p = period(Some("2023-05-02T01:57:27+02:00"), Some("someday"));
        normalize_period(&mut p);
        assert_eq!(p.end.as_deref(), Some("someday"));
    }

    #[test]
    fn open_period_stays_open() {
        let mut p = period(Some("2023-05-02T01:57:27+02:00"), None);
        normalize_period(&mut p);
        assert_eq!(p, period(Some("2023-05-02T01:57:27+02:00"), None));
    }
}
