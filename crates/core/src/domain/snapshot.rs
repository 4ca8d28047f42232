use crate::domain::financials::ExtractedFinancials;
use crate::domain::period::{FinancialPeriod, TenantId};
use crate::domain::score::HealthScoreResult;
use crate::ingest::orchestrator::SyncError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One scored sync of a tenant, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScoreSnapshot {
    pub tenant_id: TenantId,
    pub as_of_date: NaiveDate,
    pub period: FinancialPeriod,
    pub generated_at: DateTime<Utc>,
    pub result: HealthScoreResult,
    pub financials: ExtractedFinancials,
    /// Endpoints that failed during the fetch; the score was computed without them.
    pub errors: Vec<SyncError>,
}
