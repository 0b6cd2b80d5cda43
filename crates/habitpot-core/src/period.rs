//! Accounting periods for duplicate-completion checks.
//!
//! A period key names the window a confirmation counts toward: the calendar
//! date for daily habits, the ISO-8601 week for weekly habits. All dates are
//! UTC calendar dates.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::Result;
use crate::habit::Frequency;

/// Canonical key of the period containing `date`.
///
/// - daily: `YYYY-MM-DD`
/// - weekly: `YYYY-Www`, where the year is the ISO week-numbering year
pub fn period_key(frequency: Frequency, date: NaiveDate) -> String {
    match frequency {
        Frequency::Daily => date.format("%Y-%m-%d").to_string(),
        Frequency::Weekly => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
    }
}

/// String-typed variant of [`period_key`] for callers holding raw
/// frequency names.
///
/// # Errors
/// Returns `InvalidFrequency` for anything other than daily or weekly.
pub fn period_key_str(frequency: &str, date: NaiveDate) -> Result<String> {
    Ok(period_key(frequency.parse()?, date))
}

/// Period key for the UTC date of an instant.
pub fn period_key_at(frequency: Frequency, at: DateTime<Utc>) -> String {
    period_key(frequency, at.date_naive())
}

/// Monday..=Sunday span containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let since_monday = i64::from(date.weekday().num_days_from_monday());
    let monday = date - Duration::days(since_monday);
    (monday, monday + Duration::days(6))
}

/// First and last instant of `date`, inclusive.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1) - Duration::nanoseconds(1))
}

/// Whether `at` falls in the same period as `as_of`.
pub fn same_period(frequency: Frequency, at: DateTime<Utc>, as_of: DateTime<Utc>) -> bool {
    match frequency {
        Frequency::Daily => {
            let (start, end) = day_bounds(as_of.date_naive());
            start <= at && at <= end
        }
        Frequency::Weekly => {
            let (monday, sunday) = week_bounds(as_of.date_naive());
            let day = at.date_naive();
            monday <= day && day <= sunday
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn daily_key_is_iso_date() {
        assert_eq!(period_key(Frequency::Daily, d(2025, 3, 5)), "2025-03-05");
    }

    #[test]
    fn weekly_key_pads_week_number() {
        assert_eq!(period_key(Frequency::Weekly, d(2025, 3, 5)), "2025-W10");
        assert_eq!(period_key(Frequency::Weekly, d(2025, 1, 8)), "2025-W02");
    }

    #[test]
    fn weekly_key_uses_iso_year_at_boundaries() {
        // Monday 2024-12-30 starts ISO week 1 of 2025.
        assert_eq!(period_key(Frequency::Weekly, d(2024, 12, 30)), "2025-W01");
        // Sunday 2021-01-03 still belongs to 2020's week 53.
        assert_eq!(period_key(Frequency::Weekly, d(2021, 1, 3)), "2020-W53");
    }

    #[test]
    fn string_frequency_is_validated() {
        assert_eq!(period_key_str("daily", d(2025, 3, 5)).unwrap(), "2025-03-05");
        assert!(period_key_str("hourly", d(2025, 3, 5)).is_err());
    }

    #[test]
    fn week_bounds_span_monday_to_sunday() {
        assert_eq!(week_bounds(d(2025, 3, 5)), (d(2025, 3, 3), d(2025, 3, 9)));
        assert_eq!(week_bounds(d(2025, 3, 3)), (d(2025, 3, 3), d(2025, 3, 9)));
        assert_eq!(week_bounds(d(2025, 3, 9)), (d(2025, 3, 3), d(2025, 3, 9)));
    }

    #[test]
    fn day_bounds_cover_whole_day() {
        let (start, end) = day_bounds(d(2025, 3, 5));
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2025, 3, 6, 0, 0, 0).unwrap());
        assert!(end > Utc.with_ymd_and_hms(2025, 3, 5, 23, 59, 59).unwrap());
    }

    #[test]
    fn same_period_daily_and_weekly() {
        let monday = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let wednesday = Utc.with_ymd_and_hms(2025, 3, 5, 18, 0, 0).unwrap();
        let next_monday = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();

        assert!(!same_period(Frequency::Daily, monday, wednesday));
        assert!(same_period(Frequency::Weekly, monday, wednesday));
        assert!(!same_period(Frequency::Weekly, monday, next_monday));
    }
}
