use crate::domain::period::TenantId;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub tenant_id: TenantId,
    /// `category:period`, matched exactly on lookup.
    pub period_key: String,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
    /// `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Key-value persistence the cache needs: upsert, point lookup and prefix scans.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Replaces any existing entry with the same tenant and key as one unit.
    async fn upsert(&self, entry: CacheEntry) -> Result<()>;

    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<CacheEntry>>;

    async fn list_prefix(&self, tenant: TenantId, prefix: &str) -> Result<Vec<CacheEntry>>;

    /// Deletes every matching entry atomically; returns how many were removed.
    async fn delete_prefix(&self, tenant: TenantId, prefix: &str) -> Result<u64>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<(TenantId, String), CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        let mut map = self.entries.write().unwrap_or_else(|p| p.into_inner());
        map.insert((entry.tenant_id, entry.period_key.clone()), entry);
        Ok(())
    }

    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<CacheEntry>> {
        let map = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(map.get(&(tenant, key.to_string())).cloned())
    }

    async fn list_prefix(&self, tenant: TenantId, prefix: &str) -> Result<Vec<CacheEntry>> {
        let map = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(map
            .range((tenant, prefix.to_string())..)
            .take_while(|((t, k), _)| *t == tenant && k.starts_with(prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete_prefix(&self, tenant: TenantId, prefix: &str) -> Result<u64> {
        let mut map = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = map.len();
        map.retain(|(t, k), _| !(*t == tenant && k.starts_with(prefix)));
        Ok((before - map.len()) as u64)
    }
}
