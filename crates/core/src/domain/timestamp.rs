// Instant parsing/formatting at the boundaries.
// Internally instants are UTC epoch milliseconds.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parse an ISO-8601 timestamp into epoch milliseconds.
/// Naive timestamps (no offset) are taken as UTC.
pub fn parse_utc(s: &str) -> Result<i64, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    Err(format!("invalid timestamp '{s}', expected ISO-8601 UTC"))
}

/// Render epoch milliseconds as RFC 3339 UTC.
pub fn to_rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(parse_utc("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert_eq!(parse_utc("1970-01-01T01:00:00+01:00").unwrap(), 0);
    }

    #[test]
    fn test_parse_naive_as_utc() {
        assert_eq!(parse_utc("1970-01-01T00:00:01").unwrap(), 1000);
        assert_eq!(parse_utc("1970-01-01T00:00:01.500").unwrap(), 1500);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_utc("tomorrow-ish").is_err());
        assert!(parse_utc("").is_err());
    }

    #[test]
    fn test_round_trip() {
        let millis = parse_utc("2025-06-01T12:30:00Z").unwrap();
        assert_eq!(to_rfc3339(millis), "2025-06-01T12:30:00.000Z");
    }
}
