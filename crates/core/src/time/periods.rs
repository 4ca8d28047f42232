use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How volatile the data for a period still is, judged by where the period ends
/// relative to "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodFreshness {
    /// The period reaches into the current calendar month; postings still happen intraday.
    Open,
    /// The period ended in the previous calendar month; late postings are still possible.
    RecentlyClosed,
    /// The period closed before the previous month; treated as immutable.
    Historical,
}

pub fn classify_period_end(period_end: NaiveDate, today: NaiveDate) -> PeriodFreshness {
    let current_month = month_start(today);
    if period_end >= current_month {
        return PeriodFreshness::Open;
    }
    if period_end >= previous_month_start(today) {
        return PeriodFreshness::RecentlyClosed;
    }
    PeriodFreshness::Historical
}

pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date (expected YYYY-MM-DD): {s}"));
    }
    Ok(now_utc.date_naive())
}

pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

pub fn month_end(d: NaiveDate) -> NaiveDate {
    let start = month_start(d);
    let next = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
    };
    match next {
        Some(n) => n - Duration::days(1),
        None => d,
    }
}

pub fn previous_month_start(d: NaiveDate) -> NaiveDate {
    month_start(month_start(d) - Duration::days(1))
}

/// Calendar months overlapping `[start, end]`, newest first, as `(first_day, last_day)`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut out = Vec::new();
    if end < start {
        return out;
    }
    let floor = month_start(start);
    let mut cur = month_start(end);
    while cur >= floor {
        out.push((cur, month_end(cur)));
        cur = previous_month_start(cur);
    }
    out
}

/// First day of the month `months - 1` months before `as_of`'s month, so that
/// `[trailing_months_start(d, n), d]` spans exactly `n` calendar months.
pub fn trailing_months_start(as_of: NaiveDate, months: u32) -> NaiveDate {
    let mut cur = month_start(as_of);
    for _ in 1..months.max(1) {
        cur = previous_month_start(cur);
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn classifies_open_recent_and_historical_periods() {
        let today = d(2026, 3, 14);
        assert_eq!(classify_period_end(d(2026, 3, 31), today), PeriodFreshness::Open);
        assert_eq!(classify_period_end(d(2026, 3, 1), today), PeriodFreshness::Open);
        assert_eq!(
            classify_period_end(d(2026, 2, 28), today),
            PeriodFreshness::RecentlyClosed
        );
        assert_eq!(
            classify_period_end(d(2026, 1, 31), today),
            PeriodFreshness::Historical
        );
    }

    #[test]
    fn january_rolls_back_into_previous_year() {
        let today = d(2026, 1, 5);
        assert_eq!(previous_month_start(today), d(2025, 12, 1));
        assert_eq!(
            classify_period_end(d(2025, 12, 31), today),
            PeriodFreshness::RecentlyClosed
        );
        assert_eq!(
            classify_period_end(d(2025, 11, 30), today),
            PeriodFreshness::Historical
        );
    }

    #[test]
    fn month_end_handles_leap_february() {
        assert_eq!(month_end(d(2028, 2, 10)), d(2028, 2, 29));
        assert_eq!(month_end(d(2026, 12, 1)), d(2026, 12, 31));
    }

    #[test]
    fn months_between_is_newest_first_and_inclusive() {
        let months = months_between(d(2025, 11, 15), d(2026, 2, 3));
        let starts: Vec<_> = months.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            starts,
            vec![d(2026, 2, 1), d(2026, 1, 1), d(2025, 12, 1), d(2025, 11, 1)]
        );
        assert_eq!(months[0].1, d(2026, 2, 28));
    }

    #[test]
    fn trailing_months_start_spans_requested_months() {
        let start = trailing_months_start(d(2026, 10, 15), 12);
        assert_eq!(start, d(2025, 11, 1));
        assert_eq!(months_between(start, d(2026, 10, 15)).len(), 12);
    }

    #[test]
    fn resolves_explicit_or_utc_today() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 23, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now).unwrap(), d(2026, 1, 5));
        assert_eq!(
            resolve_as_of_date(Some("2025-12-31"), now).unwrap(),
            d(2025, 12, 31)
        );
        assert!(resolve_as_of_date(Some("31/12/2025"), now).is_err());
    }
}
