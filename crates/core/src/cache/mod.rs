pub mod store;

use crate::config::Settings;
use crate::domain::period::{FinancialPeriod, TenantId};
use crate::time::clock::Clock;
use crate::time::periods::{classify_period_end, PeriodFreshness};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use store::{CacheEntry, CacheStore};

const DEFAULT_OPEN_TTL_MINUTES: i64 = 15;
const DEFAULT_RECENT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    BalanceSheet,
    ProfitAndLoss,
    TrialBalance,
    Accounts,
    Receivables,
    Payables,
}

impl CacheCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::ProfitAndLoss => "profit_and_loss",
            Self::TrialBalance => "trial_balance",
            Self::Accounts => "accounts",
            Self::Receivables => "receivables",
            Self::Payables => "payables",
        }
    }

    /// Data that changes regardless of which period it is keyed under.
    fn is_always_volatile(self) -> bool {
        matches!(self, Self::Accounts | Self::Receivables | Self::Payables)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub category: CacheCategory,
    pub period: FinancialPeriod,
}

impl CacheKey {
    pub fn new(category: CacheCategory, period: FinancialPeriod) -> Self {
        Self { category, period }
    }

    pub fn as_string(&self) -> String {
        format!("{}:{}", self.category.as_str(), self.period.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub open_ttl: Duration,
    pub recently_closed_ttl: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            open_ttl: Duration::minutes(DEFAULT_OPEN_TTL_MINUTES),
            recently_closed_ttl: Duration::hours(DEFAULT_RECENT_TTL_HOURS),
        }
    }
}

impl FreshnessPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            open_ttl: Duration::minutes(
                settings
                    .cache_open_ttl_minutes
                    .unwrap_or(DEFAULT_OPEN_TTL_MINUTES),
            ),
            recently_closed_ttl: Duration::hours(
                settings
                    .cache_recent_ttl_hours
                    .unwrap_or(DEFAULT_RECENT_TTL_HOURS),
            ),
        }
    }

    /// `None` means the entry never expires.
    pub fn expires_at(&self, key: &CacheKey, fetched_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if key.category.is_always_volatile() {
            return Some(fetched_at + self.open_ttl);
        }
        match classify_period_end(key.period.end_date(), fetched_at.date_naive()) {
            PeriodFreshness::Open => Some(fetched_at + self.open_ttl),
            PeriodFreshness::RecentlyClosed => Some(fetched_at + self.recently_closed_ttl),
            PeriodFreshness::Historical => None,
        }
    }
}

/// Tenant + period keyed report cache with per-period freshness.
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    policy: FreshnessPolicy,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, policy: FreshnessPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Payload if present and unexpired. Stale entries are a miss, never returned.
    pub async fn get(&self, tenant: TenantId, key: &CacheKey) -> Result<Option<Value>> {
        let k = key.as_string();
        let Some(entry) = self.store.get(tenant, &k).await? else {
            return Ok(None);
        };
        if entry.is_expired(self.clock.now()) {
            tracing::debug!(tenant_id = %tenant, key = %k, "cache entry expired");
            return Ok(None);
        }
        Ok(Some(entry.payload))
    }

    /// Upserts the payload, recomputing expiry from the period's freshness now.
    pub async fn save(&self, tenant: TenantId, key: &CacheKey, payload: Value) -> Result<CacheEntry> {
        let now = self.clock.now();
        let entry = CacheEntry {
            tenant_id: tenant,
            period_key: key.as_string(),
            payload,
            fetched_at: now,
            expires_at: self.policy.expires_at(key, now),
        };
        self.store.upsert(entry.clone()).await?;
        tracing::debug!(
            tenant_id = %tenant,
            key = %entry.period_key,
            expires_at = ?entry.expires_at,
            "cache entry saved"
        );
        Ok(entry)
    }

    /// Purges every cached category for the tenant in one step.
    pub async fn invalidate(&self, tenant: TenantId) -> Result<u64> {
        let n = self.store.delete_prefix(tenant, "").await?;
        tracing::info!(tenant_id = %tenant, removed = n, "tenant cache invalidated");
        Ok(n)
    }

    /// Like [`get`](Self::get), decoding the payload. Undecodable payloads count as a miss.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        tenant: TenantId,
        key: &CacheKey,
    ) -> Result<Option<T>> {
        let Some(v) = self.get(tenant, key).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<T>(v) {
            Ok(t) => Ok(Some(t)),
            Err(err) => {
                tracing::warn!(tenant_id = %tenant, key = %key.as_string(), error = %err, "cached payload has unexpected shape; ignoring");
                Ok(None)
            }
        }
    }

    pub async fn save_typed<T: Serialize>(
        &self,
        tenant: TenantId,
        key: &CacheKey,
        value: &T,
    ) -> Result<CacheEntry> {
        self.save(tenant, key, serde_json::to_value(value)?).await
    }
}
