use crate::domain::validation::ValidationError;
use crate::time::periods;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One organization's account; isolated in data and rate-limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for TenantId {
    fn from(v: Uuid) -> Self {
        Self(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinancialPeriod {
    Range { start: NaiveDate, end: NaiveDate },
    AsOf { date: NaiveDate },
}

impl FinancialPeriod {
    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvertedPeriod { start, end });
        }
        Ok(Self::Range { start, end })
    }

    pub fn as_of(date: NaiveDate) -> Self {
        Self::AsOf { date }
    }

    /// The calendar month containing `d`.
    pub fn month_of(d: NaiveDate) -> Self {
        Self::Range {
            start: periods::month_start(d),
            end: periods::month_end(d),
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        match *self {
            Self::Range { start, .. } => start,
            Self::AsOf { date } => date,
        }
    }

    pub fn end_date(&self) -> NaiveDate {
        match *self {
            Self::Range { end, .. } => end,
            Self::AsOf { date } => date,
        }
    }

    /// Calendar months overlapping this period, newest first.
    pub fn months_newest_first(&self) -> Vec<FinancialPeriod> {
        periods::months_between(self.start_date(), self.end_date())
            .into_iter()
            .map(|(start, end)| Self::Range { start, end })
            .collect()
    }

    /// Stable textual key; two periods share a key only when they are identical.
    pub fn key(&self) -> String {
        match *self {
            Self::Range { start, end } => format!("{start}..{end}"),
            Self::AsOf { date } => date.to_string(),
        }
    }
}

impl fmt::Display for FinancialPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rejects_inverted_and_empty_ranges() {
        let err = FinancialPeriod::range(d(2026, 2, 1), d(2026, 1, 1)).unwrap_err();
        assert!(matches!(err, ValidationError::InvertedPeriod { .. }));
        assert!(FinancialPeriod::range(d(2026, 2, 1), d(2026, 2, 1)).is_err());
    }

    #[test]
    fn keys_distinguish_range_and_as_of() {
        let range = FinancialPeriod::range(d(2026, 1, 1), d(2026, 1, 31)).unwrap();
        assert_eq!(range.key(), "2026-01-01..2026-01-31");
        assert_eq!(FinancialPeriod::as_of(d(2026, 1, 31)).key(), "2026-01-31");
        assert_eq!(FinancialPeriod::month_of(d(2026, 1, 17)), range);
    }

    #[test]
    fn splits_range_into_months() {
        let p = FinancialPeriod::range(d(2025, 12, 10), d(2026, 2, 5)).unwrap();
        let keys: Vec<_> = p.months_newest_first().iter().map(|m| m.key()).collect();
        assert_eq!(
            keys,
            vec![
                "2026-02-01..2026-02-28",
                "2026-01-01..2026-01-31",
                "2025-12-01..2025-12-31"
            ]
        );
    }
}
