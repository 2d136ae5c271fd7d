//! Timestamps and temporary-access ranges
//!
//! Temporal filtering takes an explicit `now` everywhere so expiry
//! boundaries are testable to the exact instant. Expiry is checked lazily
//! at resolution time; expired rows are filtered, never deleted.

use crate::errors::{Result, WardenError};
use chrono::{DateTime, Duration, Utc};

/// Wall-clock timestamp used for all temporal columns
pub type Timestamp = DateTime<Utc>;

/// Current wall-clock time
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a temporary-access range string such as `"30s"`, `"15m"`, `"2h"`,
/// `"7d"`, or `"1w"` into a duration.
///
/// The range must be a positive integer followed by a single unit suffix.
pub fn parse_temporary_range(range: &str) -> Result<Duration> {
    let trimmed = range.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| malformed_range(range))?;
    let (amount, unit) = trimmed.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| malformed_range(range))?;
    if amount <= 0 {
        return Err(malformed_range(range));
    }
    let duration = match unit {
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        "w" => Duration::weeks(amount),
        _ => return Err(malformed_range(range)),
    };
    Ok(duration)
}

fn malformed_range(range: &str) -> WardenError {
    WardenError::bad_request(format!(
        "temporary range '{range}' is malformed; expected forms like '30s', '15m', '2h', '7d', '1w'"
    ))
}

/// Whether a temporary grant with the given end time has expired.
///
/// A grant is expired once `now >= end`; a grant with no end time never
/// expires.
pub fn is_expired(end: Option<Timestamp>, now: Timestamp) -> bool {
    matches!(end, Some(end) if now >= end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_temporary_range("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_temporary_range("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_temporary_range("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_temporary_range("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_temporary_range("1w").unwrap(), Duration::weeks(1));
    }

    #[test]
    fn rejects_malformed_ranges() {
        for bad in ["", "h", "2", "2 hours", "-2h", "0m", "2x"] {
            assert_matches!(
                parse_temporary_range(bad),
                Err(WardenError::BadRequest { .. }),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let end = now();
        assert!(is_expired(Some(end), end));
        assert!(is_expired(Some(end), end + Duration::seconds(1)));
        assert!(!is_expired(Some(end), end - Duration::seconds(1)));
        assert!(!is_expired(None, end));
    }
}
