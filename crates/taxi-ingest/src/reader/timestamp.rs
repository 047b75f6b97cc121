//! Timestamp parsing and reference-zone conversion

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

/// Formats tried first, in order.
const EXPLICIT_FORMATS: [&str; 5] = [
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.3f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Zone-less layouts accepted by the general fallback
const GENERAL_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S%.f %p",
    "%m/%d/%Y %H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// A parsed timestamp and whether it carried zone information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    /// Civil time with no zone attached
    Naive(NaiveDateTime),
    /// Input carried an offset and has been normalized to UTC
    Utc(NaiveDateTime),
}

impl ParsedTimestamp {
    /// Resolve to the value stored on a record.
    ///
    /// UTC-tagged values always pass through. Zone-less values are
    /// reinterpreted in `reference` only when `convert_to_utc` is set.
    pub fn resolve(self, convert_to_utc: bool, reference: Tz) -> NaiveDateTime {
        match self {
            ParsedTimestamp::Utc(value) => value,
            ParsedTimestamp::Naive(value) if convert_to_utc => civil_to_utc(value, reference),
            ParsedTimestamp::Naive(value) => value,
        }
    }
}

/// Parse one timestamp cell, `None` when every layout fails.
pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    EXPLICIT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(ParsedTimestamp::Naive)
        .or_else(|| parse_general(raw))
}

fn parse_general(raw: &str) -> Option<ParsedTimestamp> {
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(ParsedTimestamp::Utc(value.naive_utc()));
    }
    if let Ok(value) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(ParsedTimestamp::Utc(value.naive_utc()));
    }
    if let Ok(value) = DateTime::parse_from_rfc2822(raw) {
        return Some(ParsedTimestamp::Utc(value.naive_utc()));
    }

    if let Some(value) = GENERAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return Some(ParsedTimestamp::Naive(value));
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(ParsedTimestamp::Naive)
}

/// Interpret `local` as civil time in `zone` and return the UTC instant.
///
/// Ambiguous fall-back times take the later instant (standard time). Times
/// inside a spring-forward gap are shifted forward by one hour.
pub fn civil_to_utc(local: NaiveDateTime, zone: Tz) -> NaiveDateTime {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(value) => value.naive_utc(),
        LocalResult::Ambiguous(first, second) => first.naive_utc().max(second.naive_utc()),
        LocalResult::None => zone
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|value| value.naive_utc())
            .unwrap_or(local),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_explicit_formats() {
        let cases = [
            ("01/01/2020 12:28:15 AM", at(2020, 1, 1, 0, 28, 15)),
            ("01/01/2020 01:28:15 PM", at(2020, 1, 1, 13, 28, 15)),
            ("2020-01-01 00:28:15", at(2020, 1, 1, 0, 28, 15)),
            ("1/2/2020 3:04", at(2020, 1, 2, 3, 4, 0)),
            ("1/2/2020 3:04:05", at(2020, 1, 2, 3, 4, 5)),
        ];

        for (raw, expected) in cases {
            assert_eq!(
                parse_timestamp(raw),
                Some(ParsedTimestamp::Naive(expected)),
                "input {raw}"
            );
        }
    }

    #[test]
    fn test_fractional_seconds_are_kept() {
        let parsed = parse_timestamp("2020-01-01 00:28:15.125").unwrap();
        let expected = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_milli_opt(0, 28, 15, 125)
            .unwrap();
        assert_eq!(parsed, ParsedTimestamp::Naive(expected));

        let micros = parse_timestamp("2020-01-01 00:28:15.123456").unwrap();
        assert!(matches!(micros, ParsedTimestamp::Naive(_)));
    }

    #[test]
    fn test_general_fallback() {
        assert_eq!(
            parse_timestamp("2020-01-01T00:28:15"),
            Some(ParsedTimestamp::Naive(at(2020, 1, 1, 0, 28, 15)))
        );
        assert_eq!(
            parse_timestamp("2020-03-04"),
            Some(ParsedTimestamp::Naive(at(2020, 3, 4, 0, 0, 0)))
        );
    }

    #[test]
    fn test_offset_inputs_are_normalized_to_utc() {
        assert_eq!(
            parse_timestamp("2020-01-01T00:28:15Z"),
            Some(ParsedTimestamp::Utc(at(2020, 1, 1, 0, 28, 15)))
        );
        assert_eq!(
            parse_timestamp("2020-01-01T00:28:15-05:00"),
            Some(ParsedTimestamp::Utc(at(2020, 1, 1, 5, 28, 15)))
        );
    }

    #[test]
    fn test_unparseable_values() {
        for raw in ["", "   ", "yesterday", "13/45/2020 10:00", "2020-01-01 25:00:00"] {
            assert_eq!(parse_timestamp(raw), None, "input {raw:?}");
        }
    }

    #[test]
    fn test_resolve_without_conversion_keeps_civil_time() {
        let value = at(2020, 1, 1, 0, 28, 15);
        assert_eq!(ParsedTimestamp::Naive(value).resolve(false, New_York), value);
    }

    #[test]
    fn test_resolve_converts_from_reference_zone() {
        let winter = ParsedTimestamp::Naive(at(2020, 1, 1, 0, 28, 15));
        assert_eq!(winter.resolve(true, New_York), at(2020, 1, 1, 5, 28, 15));

        let summer = ParsedTimestamp::Naive(at(2020, 7, 1, 12, 0, 0));
        assert_eq!(summer.resolve(true, New_York), at(2020, 7, 1, 16, 0, 0));
    }

    #[test]
    fn test_resolve_leaves_utc_values_alone() {
        let value = at(2020, 1, 1, 5, 0, 0);
        assert_eq!(ParsedTimestamp::Utc(value).resolve(true, New_York), value);
    }

    #[test]
    fn test_ambiguous_time_uses_standard_time() {
        // 01:30 happens twice on 2020-11-01 in New York
        let local = at(2020, 11, 1, 1, 30, 0);
        assert_eq!(civil_to_utc(local, New_York), at(2020, 11, 1, 6, 30, 0));
    }

    #[test]
    fn test_gap_time_is_shifted_forward() {
        // 02:30 does not exist on 2020-03-08 in New York
        let local = at(2020, 3, 8, 2, 30, 0);
        assert_eq!(civil_to_utc(local, New_York), at(2020, 3, 8, 7, 30, 0));
    }
}
