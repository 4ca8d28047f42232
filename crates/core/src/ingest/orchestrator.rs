use crate::cache::{CacheCategory, CacheKey, CacheService};
use crate::credentials::TenantCredentials;
use crate::domain::financials::{AccountTypeMap, InvoiceKind, InvoiceSummary};
use crate::domain::period::{FinancialPeriod, TenantId};
use crate::domain::report::RawReportNode;
use crate::domain::validation::ValidationError;
use crate::ingest::error::FetchError;
use crate::ingest::fetchers::ReportFetchers;
use crate::time::clock::Clock;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

pub const BALANCE_SHEET_CURRENT: &str = "Balance Sheet (current)";
pub const BALANCE_SHEET_PRIOR: &str = "Balance Sheet (prior)";
pub const PROFIT_AND_LOSS: &str = "Profit & Loss";

const PRIOR_BALANCE_SHEET_OFFSET_DAYS: i64 = 30;

/// One failed fetch, recorded instead of aborting the sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub endpoint: String,
    pub status: Option<u16>,
    pub message: String,
    pub requires_reauthorization: bool,
}

impl SyncError {
    fn from_fetch(endpoint: &str, err: &FetchError) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            status: err.status,
            message: err.source.to_string(),
            requires_reauthorization: err.requires_reauthorization(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyReport {
    pub period: FinancialPeriod,
    pub report: RawReportNode,
}

/// Raw material for one sync. Failed fetches leave their empty value in place
/// and an entry in `errors`.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub tenant_id: TenantId,
    pub period: FinancialPeriod,
    pub fetched_at: DateTime<Utc>,
    pub balance_sheet: RawReportNode,
    pub balance_sheet_prior: RawReportNode,
    /// Contiguous run of successfully fetched months, newest first.
    pub pnl_months: Vec<MonthlyReport>,
    pub accounts: AccountTypeMap,
    pub trial_balance: RawReportNode,
    pub receivables: InvoiceSummary,
    pub payables: InvoiceSummary,
    pub errors: Vec<SyncError>,
}

impl FetchOutcome {
    pub fn failed(&self, endpoint: &str) -> bool {
        self.errors.iter().any(|e| e.endpoint == endpoint)
    }

    pub fn requires_reauthorization(&self) -> bool {
        self.errors.iter().any(|e| e.requires_reauthorization)
    }

    /// The date invoices were aged against.
    pub fn today(&self) -> NaiveDate {
        self.fetched_at.date_naive()
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    fetchers: ReportFetchers,
    cache: CacheService,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(fetchers: ReportFetchers, cache: CacheService, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetchers,
            cache,
            clock,
        }
    }

    /// Runs both fetch groups for `period`. Only a malformed period is an error;
    /// upstream failures end up in [`FetchOutcome::errors`].
    pub async fn fetch_all(
        &self,
        creds: &TenantCredentials,
        period: FinancialPeriod,
        force_refresh: bool,
    ) -> Result<FetchOutcome, ValidationError> {
        if let FinancialPeriod::Range { start, end } = period {
            if start >= end {
                return Err(ValidationError::InvertedPeriod { start, end });
            }
        }

        let tenant = creds.tenant_id;
        let fetched_at = self.clock.now();
        let today = fetched_at.date_naive();
        let end = period.end_date();
        let prior = end - Duration::days(PRIOR_BALANCE_SHEET_OFFSET_DAYS);
        let mut errors = Vec::new();

        tracing::info!(tenant_id = %tenant, %period, force_refresh, "sync fetch started");

        // Group 1: independent reports.
        let (bs_current, bs_prior, pnl, accounts) = tokio::join!(
            self.cached(
                tenant,
                CacheKey::new(CacheCategory::BalanceSheet, FinancialPeriod::as_of(end)),
                force_refresh,
                || self.fetchers.balance_sheet(creds, end),
            ),
            self.cached(
                tenant,
                CacheKey::new(CacheCategory::BalanceSheet, FinancialPeriod::as_of(prior)),
                force_refresh,
                || self.fetchers.balance_sheet(creds, prior),
            ),
            self.monthly_pnl(creds, period, force_refresh),
            self.cached(
                tenant,
                CacheKey::new(CacheCategory::Accounts, FinancialPeriod::as_of(end)),
                force_refresh,
                || self.fetchers.accounts(creds),
            ),
        );

        let balance_sheet = settle(tenant, BALANCE_SHEET_CURRENT, bs_current, &mut errors)
            .unwrap_or_else(RawReportNode::empty_report);
        let balance_sheet_prior = settle(tenant, BALANCE_SHEET_PRIOR, bs_prior, &mut errors)
            .unwrap_or_else(RawReportNode::empty_report);
        let (pnl_months, pnl_error) = pnl;
        if let Some(err) = pnl_error {
            errors.push(err);
        }
        let accounts = settle(tenant, "Accounts", accounts, &mut errors).unwrap_or_default();

        // Group 2 starts only once every Group 1 fetch has settled.
        let (trial_balance, receivables, payables) = tokio::join!(
            self.cached(
                tenant,
                CacheKey::new(CacheCategory::TrialBalance, FinancialPeriod::as_of(end)),
                force_refresh,
                || self.fetchers.trial_balance(creds, end),
            ),
            self.cached(
                tenant,
                CacheKey::new(CacheCategory::Receivables, FinancialPeriod::as_of(today)),
                force_refresh,
                || self.fetchers.invoices(creds, InvoiceKind::Receivable, today),
            ),
            self.cached(
                tenant,
                CacheKey::new(CacheCategory::Payables, FinancialPeriod::as_of(today)),
                force_refresh,
                || self.fetchers.invoices(creds, InvoiceKind::Payable, today),
            ),
        );

        let trial_balance = settle(tenant, "Trial Balance", trial_balance, &mut errors)
            .unwrap_or_else(RawReportNode::empty_report);
        let receivables = settle(tenant, InvoiceKind::Receivable.label(), receivables, &mut errors)
            .unwrap_or_else(|| InvoiceSummary::empty(InvoiceKind::Receivable));
        let payables = settle(tenant, InvoiceKind::Payable.label(), payables, &mut errors)
            .unwrap_or_else(|| InvoiceSummary::empty(InvoiceKind::Payable));

        if errors.is_empty() {
            tracing::info!(
                tenant_id = %tenant,
                pnl_months = pnl_months.len(),
                accounts = accounts.len(),
                "sync fetch complete"
            );
        } else {
            let failed: Vec<&str> = errors.iter().map(|e| e.endpoint.as_str()).collect();
            tracing::warn!(
                tenant_id = %tenant,
                pnl_months = pnl_months.len(),
                failed = ?failed,
                "sync fetch complete with partial data"
            );
        }

        Ok(FetchOutcome {
            tenant_id: tenant,
            period,
            fetched_at,
            balance_sheet,
            balance_sheet_prior,
            pnl_months,
            accounts,
            trial_balance,
            receivables,
            payables,
            errors,
        })
    }

    /// One P&L report per calendar month, each cached under its own key.
    async fn monthly_pnl(
        &self,
        creds: &TenantCredentials,
        period: FinancialPeriod,
        force_refresh: bool,
    ) -> (Vec<MonthlyReport>, Option<SyncError>) {
        let tenant = creds.tenant_id;
        let months = period.months_newest_first();
        let results = futures::future::join_all(months.iter().map(|month| {
            let month = *month;
            async move {
                let fetched = self
                    .cached(
                        tenant,
                        CacheKey::new(CacheCategory::ProfitAndLoss, month),
                        force_refresh,
                        || {
                            self.fetchers
                                .profit_and_loss(creds, month.start_date(), month.end_date())
                        },
                    )
                    .await;
                (month, fetched)
            }
        }))
        .await;

        collapse_months(tenant, results)
    }

    async fn cached<T, F, Fut>(
        &self,
        tenant: TenantId,
        key: CacheKey,
        force_refresh: bool,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if !force_refresh {
            match self.cache.get_typed::<T>(tenant, &key).await {
                Ok(Some(hit)) => {
                    tracing::debug!(tenant_id = %tenant, key = %key.as_string(), "cache hit");
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(tenant_id = %tenant, key = %key.as_string(), error = %err, "cache read failed; fetching fresh");
                }
            }
        }

        let value = fetch().await?;
        if let Err(err) = self.cache.save_typed(tenant, &key, &value).await {
            tracing::warn!(tenant_id = %tenant, key = %key.as_string(), error = %err, "cache write failed");
        }
        Ok(value)
    }
}

fn settle<T>(
    tenant: TenantId,
    endpoint: &str,
    result: Result<T, FetchError>,
    errors: &mut Vec<SyncError>,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(
                tenant_id = %tenant,
                endpoint,
                http_status = ?err.status,
                error = %err,
                "fetch failed; continuing with empty result"
            );
            errors.push(SyncError::from_fetch(endpoint, &err));
            None
        }
    }
}

/// Keeps the newest-first run of months up to the first failure and folds every
/// failed month into a single error entry.
fn collapse_months(
    tenant: TenantId,
    results: Vec<(FinancialPeriod, Result<RawReportNode, FetchError>)>,
) -> (Vec<MonthlyReport>, Option<SyncError>) {
    let total = results.len();
    let mut months = Vec::new();
    let mut failures: Vec<(FinancialPeriod, FetchError)> = Vec::new();

    for (period, result) in results {
        match result {
            Ok(report) if failures.is_empty() => months.push(MonthlyReport { period, report }),
            Ok(_) => {}
            Err(err) => failures.push((period, err)),
        }
    }

    let Some((first_period, first_err)) = failures.first() else {
        return (months, None);
    };
    tracing::warn!(
        tenant_id = %tenant,
        endpoint = PROFIT_AND_LOSS,
        failed_months = failures.len(),
        total_months = total,
        usable_months = months.len(),
        http_status = ?first_err.status,
        "monthly P&L fetch failed"
    );
    let error = SyncError {
        endpoint: PROFIT_AND_LOSS.to_string(),
        status: first_err.status,
        message: format!(
            "{} of {} months failed; first ({}): {}",
            failures.len(),
            total,
            first_period,
            first_err.source
        ),
        requires_reauthorization: failures.iter().any(|(_, e)| e.requires_reauthorization()),
    };
    (months, Some(error))
}
