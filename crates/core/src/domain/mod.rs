pub mod financials;
pub mod period;
pub mod report;
pub mod score;
pub mod snapshot;
pub mod validation;
