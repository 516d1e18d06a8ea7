//! Timestamp normalization into bucket keys
//!
//! Every source reports time its own way: naive UTC strings, naive local
//! strings, RFC 3339 with an offset, or Unix seconds. The normalizer turns
//! each of them into a UTC instant and applies the source's rounding rule.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::BucketTimestamp;

/// Default pattern for naive timestamp strings
pub const DEFAULT_PATTERN: &str = "%Y-%m-%dT%H:%M:%S";

/// Timestamp parse error
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("timestamp {value:?} does not match pattern {pattern:?}: {source}")]
    Pattern {
        value: String,
        pattern: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid RFC 3339 timestamp {value:?}: {source}")]
    Rfc3339 {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("local time {value} does not exist in {timezone}")]
    NonexistentLocalTime { value: NaiveDateTime, timezone: Tz },

    #[error("epoch value {0} is out of range")]
    EpochOutOfRange(String),

    #[error("expected a {expected} timestamp, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    #[error("value for {field:?} is not numeric: {found}")]
    NonNumeric { field: String, found: String },
}

/// How a source writes its timestamps
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampFormat {
    /// String carrying its own UTC offset
    Rfc3339,
    /// Naive string in UTC; a trailing `Z` is tolerated
    Utc { pattern: String },
    /// Naive string in a named timezone
    Local { pattern: String, timezone: Tz },
    /// Unix seconds, as a number or numeric string
    Epoch,
}

impl TimestampFormat {
    pub fn utc() -> Self {
        TimestampFormat::Utc {
            pattern: DEFAULT_PATTERN.to_string(),
        }
    }

    pub fn local(timezone: Tz) -> Self {
        TimestampFormat::Local {
            pattern: DEFAULT_PATTERN.to_string(),
            timezone,
        }
    }
}

/// Bucket rounding applied after parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    /// Keep the native resolution
    #[default]
    Exact,
    /// Minute 59 marks the end of an hourly window; move it to minute 0
    /// of the next hour
    HourEnding,
}

/// A bucket key plus whether rounding moved it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub bucket: BucketTimestamp,
    pub rounded: bool,
}

/// Turns raw source timestamps into bucket keys
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampNormalizer {
    format: TimestampFormat,
    rounding: RoundingPolicy,
}

impl TimestampNormalizer {
    pub fn new(format: TimestampFormat, rounding: RoundingPolicy) -> Self {
        Self { format, rounding }
    }

    pub fn format(&self) -> &TimestampFormat {
        &self.format
    }

    pub fn rounding(&self) -> RoundingPolicy {
        self.rounding
    }

    /// Normalize a JSON timestamp value (string or number)
    pub fn normalize(&self, raw: &Value) -> Result<BucketTimestamp, FormatError> {
        self.normalize_value(raw).map(|n| n.bucket)
    }

    /// Normalize a timestamp string
    pub fn normalize_str(&self, raw: &str) -> Result<BucketTimestamp, FormatError> {
        self.parse_str(raw).map(|n| n.bucket)
    }

    /// Normalize Unix seconds
    pub fn normalize_epoch(&self, secs: i64) -> Result<BucketTimestamp, FormatError> {
        self.parse_epoch(secs).map(|n| n.bucket)
    }

    /// Like [`normalize`](Self::normalize), also reporting whether the
    /// rounding rule moved the timestamp
    pub fn normalize_value(&self, raw: &Value) -> Result<Normalized, FormatError> {
        match raw {
            Value::String(s) => self.parse_str(s),
            Value::Number(n) => match self.format {
                TimestampFormat::Epoch => {
                    let secs = n
                        .as_i64()
                        .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                        .ok_or_else(|| FormatError::EpochOutOfRange(n.to_string()))?;
                    self.parse_epoch(secs)
                }
                _ => Err(FormatError::UnexpectedType {
                    expected: "string",
                    found: raw.to_string(),
                }),
            },
            other => Err(FormatError::UnexpectedType {
                expected: "string or number",
                found: other.to_string(),
            }),
        }
    }

    fn parse_str(&self, raw: &str) -> Result<Normalized, FormatError> {
        let raw = raw.trim();
        match &self.format {
            TimestampFormat::Rfc3339 => {
                let parsed =
                    DateTime::parse_from_rfc3339(raw).map_err(|source| FormatError::Rfc3339 {
                        value: raw.to_string(),
                        source,
                    })?;
                Ok(self.finish(parsed))
            }
            TimestampFormat::Utc { pattern } => {
                let naive = parse_naive(raw.trim_end_matches('Z'), pattern)?;
                Ok(self.finish(Utc.from_utc_datetime(&naive)))
            }
            TimestampFormat::Local { pattern, timezone } => {
                let naive = parse_naive(raw, pattern)?;
                // Fall-back hours resolve to the first occurrence.
                let local = timezone.from_local_datetime(&naive).earliest().ok_or(
                    FormatError::NonexistentLocalTime {
                        value: naive,
                        timezone: *timezone,
                    },
                )?;
                Ok(self.finish(local))
            }
            TimestampFormat::Epoch => {
                let secs: i64 = raw
                    .parse::<i64>()
                    .or_else(|_| raw.parse::<f64>().map(|f| f.trunc() as i64))
                    .map_err(|_| FormatError::UnexpectedType {
                        expected: "epoch",
                        found: raw.to_string(),
                    })?;
                self.parse_epoch(secs)
            }
        }
    }

    fn parse_epoch(&self, secs: i64) -> Result<Normalized, FormatError> {
        let ts = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| FormatError::EpochOutOfRange(secs.to_string()))?;
        Ok(self.finish(ts))
    }

    fn finish<T: TimeZone>(&self, ts: DateTime<T>) -> Normalized {
        let original = ts.with_timezone(&Utc);
        let bucket = match self.rounding {
            RoundingPolicy::Exact => original,
            RoundingPolicy::HourEnding => round_hour_ending(ts).with_timezone(&Utc),
        };
        Normalized {
            bucket,
            rounded: bucket != original,
        }
    }
}

fn parse_naive(raw: &str, pattern: &str) -> Result<NaiveDateTime, FormatError> {
    NaiveDateTime::parse_from_str(raw, pattern).map_err(|source| FormatError::Pattern {
        value: raw.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

/// Round a minute-59 timestamp forward to the start of the next hour.
///
/// The minute is read in the timestamp's own timezone, so a local
/// hour-ending sample stays hour-ending after conversion. Timestamps at any
/// other minute are returned unchanged.
pub fn round_hour_ending<T: TimeZone>(ts: DateTime<T>) -> DateTime<T> {
    if ts.minute() != 59 {
        return ts;
    }
    let truncated = ts.clone()
        - Duration::seconds(i64::from(ts.second()))
        - Duration::nanoseconds(i64::from(ts.nanosecond()));
    truncated + Duration::minutes(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> BucketTimestamp {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_minute_59_rounds_to_next_hour() {
        let n = TimestampNormalizer::new(TimestampFormat::utc(), RoundingPolicy::HourEnding);

        assert_eq!(
            n.normalize_str("2024-01-01T00:59:00").unwrap(),
            utc(2024, 1, 1, 1, 0, 0)
        );
        assert_eq!(
            n.normalize_str("2024-01-01T13:59:42Z").unwrap(),
            utc(2024, 1, 1, 14, 0, 0)
        );
        // Day and year boundaries roll over too
        assert_eq!(
            n.normalize_str("2023-12-31T23:59:00").unwrap(),
            utc(2024, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_hour_ending_leaves_other_minutes() {
        let n = TimestampNormalizer::new(TimestampFormat::utc(), RoundingPolicy::HourEnding);
        assert_eq!(
            n.normalize_str("2024-01-01T00:58:00").unwrap(),
            utc(2024, 1, 1, 0, 58, 0)
        );
        assert_eq!(
            n.normalize_str("2024-01-01T01:00:00").unwrap(),
            utc(2024, 1, 1, 1, 0, 0)
        );
    }

    #[test]
    fn test_exact_keeps_sub_hourly_cadence() {
        let n = TimestampNormalizer::new(TimestampFormat::Rfc3339, RoundingPolicy::Exact);
        for minute in (0..60).step_by(5) {
            let raw = format!("2024-06-01T10:{:02}:00-04:00", minute);
            assert_eq!(
                n.normalize_str(&raw).unwrap(),
                utc(2024, 6, 1, 14, minute, 0)
            );
        }
    }

    #[test]
    fn test_local_timezone_conversion() {
        let n = TimestampNormalizer::new(
            TimestampFormat::local(chrono_tz::America::New_York),
            RoundingPolicy::HourEnding,
        );
        // EDT is UTC-4
        assert_eq!(
            n.normalize_str("2024-07-04T09:59:00").unwrap(),
            utc(2024, 7, 4, 14, 0, 0)
        );
        // EST is UTC-5
        assert_eq!(
            n.normalize_str("2024-01-15T09:30:00").unwrap(),
            utc(2024, 1, 15, 14, 30, 0)
        );
    }

    #[test]
    fn test_nonexistent_local_time() {
        let n = TimestampNormalizer::new(
            TimestampFormat::local(chrono_tz::America::New_York),
            RoundingPolicy::Exact,
        );
        let err = n.normalize_str("2024-03-10T02:30:00").unwrap_err();
        assert!(matches!(err, FormatError::NonexistentLocalTime { .. }));
    }

    #[test]
    fn test_ambiguous_local_time_takes_earliest() {
        let n = TimestampNormalizer::new(
            TimestampFormat::local(chrono_tz::America::New_York),
            RoundingPolicy::Exact,
        );
        // 01:30 happens twice on 2024-11-03; the first is still EDT
        assert_eq!(
            n.normalize_str("2024-11-03T01:30:00").unwrap(),
            utc(2024, 11, 3, 5, 30, 0)
        );
    }

    #[test]
    fn test_epoch_number_and_string() {
        let n = TimestampNormalizer::new(TimestampFormat::Epoch, RoundingPolicy::Exact);
        assert_eq!(
            n.normalize(&json!(1704070800)).unwrap(),
            utc(2024, 1, 1, 1, 0, 0)
        );
        assert_eq!(
            n.normalize(&json!("1704070800")).unwrap(),
            utc(2024, 1, 1, 1, 0, 0)
        );
        assert_eq!(
            n.normalize(&json!(1704070800.0)).unwrap(),
            utc(2024, 1, 1, 1, 0, 0)
        );
    }

    #[test]
    fn test_bad_input_is_format_error() {
        let n = TimestampNormalizer::new(TimestampFormat::utc(), RoundingPolicy::Exact);
        assert!(matches!(
            n.normalize_str("yesterday").unwrap_err(),
            FormatError::Pattern { .. }
        ));
        assert!(matches!(
            n.normalize(&json!(12)).unwrap_err(),
            FormatError::UnexpectedType { .. }
        ));
        assert!(matches!(
            n.normalize(&Value::Null).unwrap_err(),
            FormatError::UnexpectedType { .. }
        ));

        let rfc = TimestampNormalizer::new(TimestampFormat::Rfc3339, RoundingPolicy::Exact);
        assert!(matches!(
            rfc.normalize_str("2024-01-01T00:00:00").unwrap_err(),
            FormatError::Rfc3339 { .. }
        ));
    }

    #[test]
    fn test_normalize_value_reports_rounding() {
        let n = TimestampNormalizer::new(TimestampFormat::utc(), RoundingPolicy::HourEnding);
        let moved = n.normalize_value(&json!("2024-01-01T00:59:00")).unwrap();
        assert!(moved.rounded);
        assert_eq!(moved.bucket, utc(2024, 1, 1, 1, 0, 0));

        let kept = n.normalize_value(&json!("2024-01-01T01:00:00")).unwrap();
        assert!(!kept.rounded);
    }

}
