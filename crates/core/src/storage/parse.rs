//! Stored value parsing utilities
//!
//! Timestamps are kept as decimal epoch milliseconds. Anything else is
//! treated as absent so a damaged key degrades into an expired session
//! rather than an error.

use chrono::{DateTime, Utc};
use rusqlite::Error as SqlError;

/// Format an instant as epoch millis
pub fn format_millis(at: DateTime<Utc>) -> String {
    at.timestamp_millis().to_string()
}

/// Parse epoch millis, `None` for anything unparseable
pub fn parse_millis(s: &str) -> Option<DateTime<Utc>> {
    s.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// Parse an optional stored timestamp
pub fn parse_millis_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().and_then(parse_millis)
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_roundtrip() {
        let at = DateTime::from_timestamp_millis(1_700_000_123_456).unwrap();
        assert_eq!(format_millis(at), "1700000123456");
        assert_eq!(parse_millis("1700000123456"), Some(at));
    }

    #[test]
    fn test_garbage_is_absent() {
        assert_eq!(parse_millis("yesterday"), None);
        assert_eq!(parse_millis(""), None);
        assert_eq!(parse_millis_opt(None), None);
    }
}
