use crate::config::Settings;
use crate::credentials::TenantCredentials;
use crate::domain::financials::InvoiceKind;
use crate::ingest::error::ApiError;
use anyhow::Context;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const TENANT_HEADER: &str = "xero-tenant-id";

/// One request the accounting API understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    BalanceSheet { date: NaiveDate },
    ProfitAndLoss { from: NaiveDate, to: NaiveDate },
    TrialBalance { date: NaiveDate },
    Accounts,
    Invoices { kind: InvoiceKind, page: u32 },
}

impl Endpoint {
    /// Human-readable name used in logs and the sync error list.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BalanceSheet { .. } => "Balance Sheet",
            Self::ProfitAndLoss { .. } => "Profit & Loss",
            Self::TrialBalance { .. } => "Trial Balance",
            Self::Accounts => "Accounts",
            Self::Invoices { kind, .. } => kind.label(),
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::BalanceSheet { .. } => "Reports/BalanceSheet",
            Self::ProfitAndLoss { .. } => "Reports/ProfitAndLoss",
            Self::TrialBalance { .. } => "Reports/TrialBalance",
            Self::Accounts => "Accounts",
            Self::Invoices { .. } => "Invoices",
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::BalanceSheet { date } => vec![
                ("date", date.to_string()),
                ("standardLayout", "true".to_string()),
            ],
            Self::ProfitAndLoss { from, to } => vec![
                ("fromDate", from.to_string()),
                ("toDate", to.to_string()),
                ("standardLayout", "true".to_string()),
            ],
            Self::TrialBalance { date } => vec![("date", date.to_string())],
            Self::Accounts => Vec::new(),
            Self::Invoices { kind, page } => vec![
                (
                    "where",
                    format!(
                        "Type==\"{}\" AND Status==\"AUTHORISED\"",
                        kind.wire_type()
                    ),
                ),
                ("page", page.to_string()),
            ],
        }
    }
}

#[async_trait::async_trait]
pub trait AccountingApi: Send + Sync {
    /// Issues exactly one request. Retry and rate limiting happen above this seam.
    async fn get(&self, creds: &TenantCredentials, endpoint: &Endpoint) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpAccountingApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccountingApi {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_accounting_api_base_url()?.to_string();
        let timeout_secs = settings
            .accounting_api_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build accounting API http client")?;

        Ok(Self { http, base_url })
    }

    fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint.path())
    }

    fn headers(creds: &TenantCredentials) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", creds.access_token))
            .map_err(|e| ApiError::Transport(format!("invalid access token header: {e}")))?;
        let tenant = HeaderValue::from_str(&creds.upstream_tenant_id)
            .map_err(|e| ApiError::Transport(format!("invalid tenant header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(TENANT_HEADER, tenant);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl AccountingApi for HttpAccountingApi {
    async fn get(&self, creds: &TenantCredentials, endpoint: &Endpoint) -> Result<Value, ApiError> {
        let res = self
            .http
            .get(self.url(endpoint))
            .headers(Self::headers(creds)?)
            .query(&endpoint.query())
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = res.status();
        let retry_after = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = res
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), retry_after, text));
        }

        serde_json::from_str::<Value>(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// `Retry-After` in delta-seconds; fractional values are accepted.
pub fn parse_retry_after(s: &str) -> Option<Duration> {
    let secs = s.trim().parse::<f64>().ok()?;
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn builds_report_queries() {
        let pnl = Endpoint::ProfitAndLoss {
            from: d(2026, 1, 1),
            to: d(2026, 1, 31),
        };
        assert_eq!(pnl.path(), "Reports/ProfitAndLoss");
        assert_eq!(pnl.label(), "Profit & Loss");
        assert!(pnl.query().contains(&("fromDate", "2026-01-01".to_string())));

        let inv = Endpoint::Invoices {
            kind: InvoiceKind::Payable,
            page: 2,
        };
        let q = inv.query();
        assert_eq!(q[0].1, "Type==\"ACCPAY\" AND Status==\"AUTHORISED\"");
        assert_eq!(q[1], ("page", "2".to_string()));
        assert_eq!(inv.label(), "Payables");
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("1e30"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("NaN"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
