//! Fetch window resolution

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use wxlog_config::WindowSpec;
use wxlog_core::FetchWindow;

use crate::{IngestError, IngestResult};

/// Resolve the window a source asks for at `now`.
///
/// `date` replaces the configured window with that whole local day,
/// which is how missed days are backfilled.
pub fn resolve_window(
    kind: WindowSpec,
    timezone: Tz,
    now: DateTime<Utc>,
    date: Option<NaiveDate>,
) -> IngestResult<FetchWindow> {
    if let Some(day) = date {
        return local_day(timezone, day);
    }
    let today = now.with_timezone(&timezone).date_naive();
    match kind {
        WindowSpec::PreviousDay => {
            let day = today
                .pred_opt()
                .ok_or_else(|| IngestError::Window(format!("no day before {}", today)))?;
            local_day(timezone, day)
        }
        WindowSpec::CurrentDay => local_day(timezone, today),
        WindowSpec::Trailing {
            lag_minutes,
            span_minutes,
        } => {
            let end = Duration::try_minutes(lag_minutes)
                .and_then(|lag| now.checked_sub_signed(lag))
                .ok_or_else(|| IngestError::Window(format!("lag of {} minutes", lag_minutes)))?;
            let start = Duration::try_minutes(span_minutes)
                .and_then(|span| end.checked_sub_signed(span))
                .ok_or_else(|| IngestError::Window(format!("span of {} minutes", span_minutes)))?;
            Ok(FetchWindow::new(start, end))
        }
    }
}

/// 00:00:00 through 23:59:59 of `day` in `timezone`
pub fn local_day(timezone: Tz, day: NaiveDate) -> IngestResult<FetchWindow> {
    let start = local_instant(timezone, day.and_time(NaiveTime::MIN))?;
    let last_second = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| IngestError::Window("bad end of day".to_string()))?;
    let end = local_instant(timezone, day.and_time(last_second))?;
    Ok(FetchWindow::new(start, end))
}

// Skipped wall times (midnight DST switches) move forward one hour.
fn local_instant(timezone: Tz, naive: NaiveDateTime) -> IngestResult<DateTime<Utc>> {
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            timezone
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        })
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| IngestError::Window(format!("{} does not exist in {}", naive, timezone)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::US::Eastern;

    #[test]
    fn test_previous_day_in_eastern() {
        // 2024-06-02 01:30 UTC is still June 1st in New York.
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 1, 30, 0).unwrap();
        let window = resolve_window(WindowSpec::PreviousDay, Eastern, now, None).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 5, 31, 4, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 6, 1, 3, 59, 59).unwrap());
    }

    #[test]
    fn test_current_day_utc() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 1, 30, 0).unwrap();
        let window = resolve_window(WindowSpec::CurrentDay, Tz::UTC, now, None).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 6, 2, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_trailing_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let kind = WindowSpec::Trailing {
            lag_minutes: 15,
            span_minutes: 4,
        };
        let window = resolve_window(kind, Tz::UTC, now, None).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 6, 2, 11, 41, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 6, 2, 11, 45, 0).unwrap());
    }

    #[test]
    fn test_oversized_trailing_window_is_an_error() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let kind = WindowSpec::Trailing {
            lag_minutes: 9_000_000_000_000_000,
            span_minutes: 4,
        };
        let err = resolve_window(kind, Tz::UTC, now, None).unwrap_err();
        assert!(matches!(err, IngestError::Window(_)));

        let kind = WindowSpec::Trailing {
            lag_minutes: 0,
            span_minutes: i64::MAX,
        };
        assert!(resolve_window(kind, Tz::UTC, now, None).is_err());
    }

    #[test]
    fn test_date_override() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let kind = WindowSpec::Trailing {
            lag_minutes: 15,
            span_minutes: 4,
        };
        let window = resolve_window(kind, Eastern, now, Some(day)).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 16, 4, 59, 59).unwrap());
    }

    #[test]
    fn test_dst_day_is_23_hours() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let window = local_day(Eastern, day).unwrap();
        assert_eq!(window.end - window.start, Duration::hours(23) - Duration::seconds(1));
    }
}
