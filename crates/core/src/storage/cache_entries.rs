use crate::cache::store::{CacheEntry, CacheStore};
use crate::domain::period::TenantId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// `report_cache` table, one row per (tenant, key).
#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: sqlx::PgPool,
}

impl PgCacheStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

type EntryRow = (String, Value, DateTime<Utc>, Option<DateTime<Utc>>);

fn like_prefix(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn into_entry(tenant: TenantId, row: EntryRow) -> CacheEntry {
    let (period_key, payload, fetched_at, expires_at) = row;
    CacheEntry {
        tenant_id: tenant,
        period_key,
        payload,
        fetched_at,
        expires_at,
    }
}

#[async_trait::async_trait]
impl CacheStore for PgCacheStore {
    async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO report_cache (tenant_id, period_key, payload, fetched_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (tenant_id, period_key) DO UPDATE SET \
               payload = EXCLUDED.payload, \
               fetched_at = EXCLUDED.fetched_at, \
               expires_at = EXCLUDED.expires_at",
        )
        .persistent(false)
        .bind(entry.tenant_id.0)
        .bind(&entry.period_key)
        .bind(&entry.payload)
        .bind(entry.fetched_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "upsert report_cache failed (tenant={}, key={})",
                entry.tenant_id, entry.period_key
            )
        })?;
        Ok(())
    }

    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT period_key, payload, fetched_at, expires_at \
             FROM report_cache \
             WHERE tenant_id = $1 AND period_key = $2",
        )
        .persistent(false)
        .bind(tenant.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("load report_cache failed (tenant={tenant}, key={key})"))?;
        Ok(row.map(|r| into_entry(tenant, r)))
    }

    async fn list_prefix(&self, tenant: TenantId, prefix: &str) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT period_key, payload, fetched_at, expires_at \
             FROM report_cache \
             WHERE tenant_id = $1 AND period_key LIKE $2 \
             ORDER BY period_key",
        )
        .persistent(false)
        .bind(tenant.0)
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("scan report_cache failed (tenant={tenant}, prefix={prefix})"))?;
        Ok(rows.into_iter().map(|r| into_entry(tenant, r)).collect())
    }

    async fn delete_prefix(&self, tenant: TenantId, prefix: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let removed = sqlx::query(
            "DELETE FROM report_cache \
             WHERE tenant_id = $1 AND period_key LIKE $2",
        )
        .persistent(false)
        .bind(tenant.0)
        .bind(like_prefix(prefix))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("purge report_cache failed (tenant={tenant}, prefix={prefix})"))?
        .rows_affected();

        tx.commit().await.context("commit transaction failed")?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix(""), "%");
        assert_eq!(like_prefix("profit_and_loss:"), "profit\\_and\\_loss:%");
        assert_eq!(like_prefix("50%"), "50\\%%");
    }
}
