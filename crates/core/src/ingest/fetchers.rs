use crate::config::Settings;
use crate::credentials::TenantCredentials;
use crate::domain::financials::{AccountTypeMap, InvoiceKind, InvoiceRecord, InvoiceSummary};
use crate::domain::report::RawReportNode;
use crate::ingest::client::{AccountingApi, Endpoint};
use crate::ingest::error::FetchError;
use crate::ingest::normalize;
use crate::ingest::rate_limiter::RateLimiter;
use crate::ingest::retry::RetryHandler;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

const DEFAULT_MAX_PAGES: u32 = 100;
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceFetchOptions {
    /// Hard pagination cap; reaching it marks the summary truncated.
    pub max_pages: u32,
    /// A page shorter than this is the last one.
    pub page_size: usize,
}

impl Default for InvoiceFetchOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl InvoiceFetchOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_pages: settings
                .invoice_max_pages
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_PAGES),
            ..Self::default()
        }
    }
}

/// Gated, retried calls for each report kind, normalized at the boundary.
#[derive(Clone)]
pub struct ReportFetchers {
    api: Arc<dyn AccountingApi>,
    limiter: Arc<RateLimiter>,
    retry: RetryHandler,
    invoice_options: InvoiceFetchOptions,
}

impl ReportFetchers {
    pub fn new(
        api: Arc<dyn AccountingApi>,
        limiter: Arc<RateLimiter>,
        retry: RetryHandler,
        invoice_options: InvoiceFetchOptions,
    ) -> Self {
        Self {
            api,
            limiter,
            retry,
            invoice_options,
        }
    }

    async fn call(
        &self,
        creds: &TenantCredentials,
        endpoint: &Endpoint,
    ) -> Result<Value, FetchError> {
        let api = &self.api;
        let limiter = &self.limiter;
        let tenant = creds.tenant_id;
        self.retry
            .execute_with_retry(endpoint.label(), || async move {
                limiter.acquire(tenant).await;
                api.get(creds, endpoint).await
            })
            .await
            .map_err(|e| FetchError::new(endpoint.label(), e))
    }

    async fn report(
        &self,
        creds: &TenantCredentials,
        endpoint: Endpoint,
    ) -> Result<RawReportNode, FetchError> {
        let payload = self.call(creds, &endpoint).await?;
        let tree =
            normalize::report_tree(&payload).map_err(|e| FetchError::new(endpoint.label(), e))?;
        tracing::debug!(
            tenant_id = %creds.tenant_id,
            endpoint = endpoint.label(),
            rows = tree.children.len(),
            "report fetched"
        );
        Ok(tree)
    }

    pub async fn balance_sheet(
        &self,
        creds: &TenantCredentials,
        date: NaiveDate,
    ) -> Result<RawReportNode, FetchError> {
        self.report(creds, Endpoint::BalanceSheet { date }).await
    }

    pub async fn profit_and_loss(
        &self,
        creds: &TenantCredentials,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RawReportNode, FetchError> {
        self.report(creds, Endpoint::ProfitAndLoss { from, to }).await
    }

    pub async fn trial_balance(
        &self,
        creds: &TenantCredentials,
        date: NaiveDate,
    ) -> Result<RawReportNode, FetchError> {
        self.report(creds, Endpoint::TrialBalance { date }).await
    }

    pub async fn accounts(&self, creds: &TenantCredentials) -> Result<AccountTypeMap, FetchError> {
        let endpoint = Endpoint::Accounts;
        let payload = self.call(creds, &endpoint).await?;
        normalize::account_type_map(&payload).map_err(|e| FetchError::new(endpoint.label(), e))
    }

    /// Pages through authorised invoices of one kind and summarizes them as of `today`.
    pub async fn invoices(
        &self,
        creds: &TenantCredentials,
        kind: InvoiceKind,
        today: NaiveDate,
    ) -> Result<InvoiceSummary, FetchError> {
        let opts = self.invoice_options;
        let mut all = Vec::new();
        let mut page: u32 = 1;
        let mut truncated = false;

        loop {
            let endpoint = Endpoint::Invoices { kind, page };
            let payload = self.call(creds, &endpoint).await?;
            let batch =
                normalize::invoice_page(&payload).map_err(|e| FetchError::new(kind.label(), e))?;
            let n = batch.len();
            all.extend(batch);

            if n == 0 || n < opts.page_size {
                break;
            }
            if page >= opts.max_pages {
                tracing::warn!(
                    tenant_id = %creds.tenant_id,
                    endpoint = kind.label(),
                    max_pages = opts.max_pages,
                    "invoice pagination hit safety cap; result truncated"
                );
                truncated = true;
                break;
            }
            page += 1;
        }

        let summary = summarize_invoices(
            kind,
            all,
            creds.base_currency.as_deref(),
            today,
            page,
            truncated,
        );
        if summary.multi_currency_detected {
            tracing::warn!(
                tenant_id = %creds.tenant_id,
                endpoint = kind.label(),
                base_currency = ?summary.base_currency,
                currencies = ?summary.currencies_found,
                excluded = summary.excluded_foreign_count,
                "multi-currency invoices detected; foreign invoices excluded from totals"
            );
        }
        Ok(summary)
    }
}

/// Totals over base-currency invoices only; anything else is counted as excluded.
pub fn summarize_invoices(
    kind: InvoiceKind,
    invoices: Vec<InvoiceRecord>,
    base_currency_hint: Option<&str>,
    today: NaiveDate,
    pages_fetched: u32,
    truncated: bool,
) -> InvoiceSummary {
    let base_currency = base_currency_hint
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .or_else(|| invoices.iter().find_map(|i| i.currency_code.clone()));

    let mut currencies = BTreeSet::new();
    let mut summary = InvoiceSummary::empty(kind);
    let mut overdue_days_sum: i64 = 0;

    for inv in invoices {
        if let Some(c) = &inv.currency_code {
            currencies.insert(c.clone());
        }
        let in_base = match (&inv.currency_code, &base_currency) {
            (Some(c), Some(base)) => c == base,
            _ => true,
        };
        if !in_base {
            summary.excluded_foreign_count += 1;
            continue;
        }

        summary.total += inv.amount_due;
        summary.count += 1;
        if let Some(due) = inv.due_date {
            if due < today && inv.amount_due > 0.0 {
                summary.overdue_amount += inv.amount_due;
                summary.overdue_count += 1;
                overdue_days_sum += (today - due).num_days();
            }
        }
        summary.invoices.push(inv);
    }

    summary.avg_days_overdue = (summary.overdue_count > 0)
        .then(|| overdue_days_sum as f64 / summary.overdue_count as f64);
    summary.multi_currency_detected = currencies.len() > 1 || summary.excluded_foreign_count > 0;
    summary.currencies_found = currencies.into_iter().collect();
    summary.base_currency = base_currency;
    summary.pages_fetched = pages_fetched;
    summary.truncated = truncated;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fake::{creds, ScriptedApi};
    use crate::ingest::rate_limiter::RateLimitConfig;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn inv(id: &str, currency: Option<&str>, amount: f64, due: Option<NaiveDate>) -> InvoiceRecord {
        InvoiceRecord {
            invoice_id: id.to_string(),
            invoice_number: None,
            contact_name: None,
            currency_code: currency.map(str::to_string),
            amount_due: amount,
            due_date: due,
        }
    }

    fn fetchers(api: Arc<ScriptedApi>, opts: InvoiceFetchOptions) -> ReportFetchers {
        ReportFetchers::new(
            api,
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            RetryHandler::default(),
            opts,
        )
    }

    fn page(n: usize) -> Value {
        let invoices: Vec<Value> = (0..n)
            .map(|i| json!({"InvoiceID": format!("i{i}"), "CurrencyCode": "NZD", "AmountDue": 10.0}))
            .collect();
        json!({ "Invoices": invoices })
    }

    #[test]
    fn excludes_foreign_currency_from_totals() {
        let today = d(2026, 2, 1);
        let s = summarize_invoices(
            InvoiceKind::Receivable,
            vec![
                inv("a", Some("NZD"), 100.0, Some(d(2026, 1, 1))),
                inv("b", Some("USD"), 999.0, Some(d(2026, 1, 1))),
                inv("c", None, 50.0, Some(d(2026, 3, 1))),
            ],
            Some("nzd"),
            today,
            1,
            false,
        );
        assert_eq!(s.total, 150.0);
        assert_eq!(s.count, 2);
        assert_eq!(s.overdue_amount, 100.0);
        assert_eq!(s.avg_days_overdue, Some(31.0));
        assert_eq!(s.base_currency.as_deref(), Some("NZD"));
        assert_eq!(s.currencies_found, vec!["NZD".to_string(), "USD".to_string()]);
        assert!(s.multi_currency_detected);
        assert_eq!(s.excluded_foreign_count, 1);
    }

    #[test]
    fn base_currency_falls_back_to_first_seen() {
        let s = summarize_invoices(
            InvoiceKind::Payable,
            vec![inv("a", Some("AUD"), 10.0, None), inv("b", Some("AUD"), 5.0, None)],
            None,
            d(2026, 2, 1),
            1,
            false,
        );
        assert_eq!(s.base_currency.as_deref(), Some("AUD"));
        assert!(!s.multi_currency_detected);
        assert_eq!(s.avg_days_overdue, None);
    }

    #[tokio::test(start_paused = true)]
    async fn paginates_until_short_page() {
        let api = Arc::new(ScriptedApi::default());
        api.push("Receivables", Ok(page(2)));
        api.push("Receivables", Ok(page(1)));
        let f = fetchers(
            api.clone(),
            InvoiceFetchOptions {
                max_pages: 10,
                page_size: 2,
            },
        );

        let s = f
            .invoices(&creds(), InvoiceKind::Receivable, d(2026, 2, 1))
            .await
            .unwrap();
        assert_eq!(s.count, 3);
        assert_eq!(s.pages_fetched, 2);
        assert!(!s.truncated);
        assert_eq!(api.calls_for("Receivables"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn marks_truncated_at_page_cap() {
        let api = Arc::new(ScriptedApi::default());
        for _ in 0..5 {
            api.push("Payables", Ok(page(2)));
        }
        let f = fetchers(
            api.clone(),
            InvoiceFetchOptions {
                max_pages: 3,
                page_size: 2,
            },
        );

        let s = f
            .invoices(&creds(), InvoiceKind::Payable, d(2026, 2, 1))
            .await
            .unwrap();
        assert!(s.truncated);
        assert_eq!(s.count, 6);
        assert_eq!(api.calls_for("Payables"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_tagged_with_endpoint_and_status() {
        let api = Arc::new(ScriptedApi::default());
        api.push(
            "Trial Balance",
            Err(crate::ingest::error::ApiError::from_status(404, None, "missing".into())),
        );
        let f = fetchers(api, InvoiceFetchOptions::default());
        let err = f.trial_balance(&creds(), d(2026, 1, 31)).await.unwrap_err();
        assert_eq!(err.endpoint, "Trial Balance");
        assert_eq!(err.status, Some(404));
    }
}
