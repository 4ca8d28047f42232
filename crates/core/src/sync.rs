//! One tenant end to end: credentials, fetch, extract, score.

use crate::credentials::CredentialStore;
use crate::domain::period::{FinancialPeriod, TenantId};
use crate::domain::snapshot::HealthScoreSnapshot;
use crate::extract;
use crate::ingest::orchestrator::Orchestrator;
use crate::scoring;
use crate::time::clock::Clock;
use anyhow::{bail, Context};
use std::sync::Arc;

#[derive(Clone)]
pub struct SyncService {
    orchestrator: Orchestrator,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    pub fn new(
        orchestrator: Orchestrator,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            credentials,
            clock,
        }
    }

    /// Fetches and scores `period` for the tenant. Endpoint failures do not fail the sync;
    /// they are carried in the snapshot's `errors` and the score works around them.
    pub async fn sync_tenant(
        &self,
        tenant: TenantId,
        period: FinancialPeriod,
        force_refresh: bool,
    ) -> anyhow::Result<HealthScoreSnapshot> {
        let Some(creds) = self.credentials.load(tenant).await? else {
            bail!("no accounting credentials stored for tenant {tenant}");
        };
        if creds.requires_reauthorization {
            bail!("tenant {tenant} must re-authorize its accounting connection");
        }
        if creds.is_expired(self.clock.now()) {
            tracing::warn!(tenant_id = %tenant, expires_at = ?creds.expires_at, "access token looks expired; trying anyway");
        }

        let outcome = self
            .orchestrator
            .fetch_all(&creds, period, force_refresh)
            .await
            .with_context(|| format!("invalid sync period {period}"))?;

        if outcome.requires_reauthorization() {
            self.credentials
                .mark_requires_reauthorization(tenant)
                .await
                .with_context(|| format!("failed to flag tenant {tenant} for re-authorization"))?;
            tracing::warn!(tenant_id = %tenant, "accounting API rejected the grant; tenant flagged for re-authorization");
        }
        for e in &outcome.errors {
            tracing::warn!(
                tenant_id = %tenant,
                endpoint = %e.endpoint,
                http_status = ?e.status,
                error = %e.message,
                "endpoint unavailable for this sync"
            );
        }

        let financials = extract::extract_all(&outcome);
        let result = scoring::calculate(
            &financials.balance_sheet,
            &financials.pnl,
            financials.receivables.as_ref(),
            financials.payables.as_ref(),
        )
        .context("extracted financials failed validation")?;

        tracing::info!(
            tenant_id = %tenant,
            final_score = result.final_score,
            grade = result.grade.as_str(),
            confidence = result.confidence.as_str(),
            errors = outcome.errors.len(),
            "health score computed"
        );

        Ok(HealthScoreSnapshot {
            tenant_id: tenant,
            as_of_date: period.end_date(),
            period,
            generated_at: self.clock.now(),
            result,
            financials,
            errors: outcome.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryCacheStore;
    use crate::cache::{CacheService, FreshnessPolicy};
    use crate::credentials::MemoryCredentialStore;
    use crate::domain::score::{MetricId, MetricStatus};
    use crate::ingest::error::ApiError;
    use crate::ingest::fake::{creds, tenant, ScriptedApi};
    use crate::ingest::fetchers::{InvoiceFetchOptions, ReportFetchers};
    use crate::ingest::orchestrator::PROFIT_AND_LOSS;
    use crate::ingest::rate_limiter::{RateLimitConfig, RateLimiter};
    use crate::ingest::retry::RetryHandler;
    use crate::time::clock::ManualClock;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::{json, Value};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn report(rows: Value) -> Value {
        json!({"Reports": [{"ReportName": "Report", "Rows": rows}]})
    }

    fn script(api: &ScriptedApi) {
        api.respond_with("Balance Sheet", |_| {
            Ok(report(json!([
                {"RowType": "Section", "Title": "Bank", "Rows": [
                    {"RowType": "SummaryRow", "Cells": [{"Value": "Total Bank"}, {"Value": "49,600.00"}]}
                ]},
                {"RowType": "Section", "Title": "Current Liabilities", "Rows": [
                    {"RowType": "SummaryRow", "Cells": [{"Value": "Total Current Liabilities"}, {"Value": "20,000.00"}]}
                ]}
            ])))
        });
        api.respond_with("Profit & Loss", |_| {
            Err(ApiError::from_status(503, None, "unavailable".into()))
        });
        api.respond_with("Accounts", |_| Ok(json!({"Accounts": []})));
        api.respond_with("Trial Balance", |_| Ok(report(json!([]))));
        api.respond_with("Receivables", |_| Ok(json!({"Invoices": []})));
        api.respond_with("Payables", |_| Ok(json!({"Invoices": []})));
    }

    async fn service(api: Arc<ScriptedApi>) -> (SyncService, Arc<MemoryCredentialStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap(),
        ));
        let fetchers = ReportFetchers::new(
            api,
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            RetryHandler::default(),
            InvoiceFetchOptions::default(),
        );
        let cache = CacheService::new(
            Arc::new(MemoryCacheStore::default()),
            clock.clone(),
            FreshnessPolicy::default(),
        );
        let store = Arc::new(MemoryCredentialStore::default());
        store.save(&creds()).await.unwrap();
        let svc = SyncService::new(
            Orchestrator::new(fetchers, cache, clock.clone()),
            store.clone(),
            clock,
        );
        (svc, store)
    }

    fn quarter() -> FinancialPeriod {
        FinancialPeriod::range(d(2025, 12, 1), d(2026, 2, 28)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn scores_without_profit_and_loss() {
        let api = Arc::new(ScriptedApi::default());
        script(&api);
        let (svc, _) = service(api).await;

        let snap = svc.sync_tenant(tenant(), quarter(), false).await.unwrap();

        assert_eq!(snap.errors.len(), 1);
        assert_eq!(snap.errors[0].endpoint, PROFIT_AND_LOSS);
        assert!(snap.financials.pnl.is_empty());
        assert_eq!(snap.financials.balance_sheet.cash, Some(49_600.0));
        assert_eq!(snap.as_of_date, d(2026, 2, 28));

        let a1 = snap.result.subscore(MetricId::A1).unwrap();
        assert_eq!(a1.status, MetricStatus::Missing);
        let d1 = snap.result.subscore(MetricId::D1).unwrap();
        assert_eq!(d1.status, MetricStatus::Missing);
        assert!(snap.result.final_score >= 0.0 && snap.result.final_score <= 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_grant_flags_tenant_and_blocks_next_sync() {
        let api = Arc::new(ScriptedApi::default());
        script(&api);
        api.respond_with("Accounts", |_| {
            Err(ApiError::from_status(400, None, r#"{"error":"invalid_grant"}"#.into()))
        });
        let (svc, store) = service(api).await;

        let snap = svc.sync_tenant(tenant(), quarter(), false).await.unwrap();
        assert!(snap.errors.iter().any(|e| e.requires_reauthorization));
        assert!(store.load(tenant()).await.unwrap().unwrap().requires_reauthorization);

        let err = svc.sync_tenant(tenant(), quarter(), false).await.unwrap_err();
        assert!(err.to_string().contains("re-authorize"));
    }

    #[tokio::test]
    async fn unknown_tenant_is_an_error() {
        let api = Arc::new(ScriptedApi::default());
        let (svc, _) = service(api.clone()).await;
        let other = TenantId(uuid::Uuid::from_u128(1));
        assert!(svc.sync_tenant(other, quarter(), false).await.is_err());
        assert!(api.calls().is_empty());
    }
}
