use chrono::NaiveDate;

/// Malformed input that must fail fast instead of being coerced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("period start {start} must be before end {end}")]
    InvertedPeriod { start: NaiveDate, end: NaiveDate },

    #[error("{field} must be a finite number (got {value})")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("monthly P&L series must be newest first: {newer} is not after {older}")]
    UnorderedSeries { newer: NaiveDate, older: NaiveDate },
}
