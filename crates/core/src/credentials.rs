use crate::domain::period::TenantId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Bearer credentials for one tenant's accounting connection.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantCredentials {
    pub tenant_id: TenantId,
    pub access_token: String,
    /// Organisation id the accounting API expects in its tenant header.
    pub upstream_tenant_id: String,
    pub base_currency: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set once the API answered `invalid_grant`; cleared by a fresh connection.
    pub requires_reauthorization: bool,
}

impl std::fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"<redacted>")
            .field("upstream_tenant_id", &self.upstream_tenant_id)
            .field("base_currency", &self.base_currency)
            .field("expires_at", &self.expires_at)
            .field("requires_reauthorization", &self.requires_reauthorization)
            .finish()
    }
}

impl TenantCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, tenant: TenantId) -> Result<Option<TenantCredentials>>;
    async fn save(&self, creds: &TenantCredentials) -> Result<()>;
    async fn mark_requires_reauthorization(&self, tenant: TenantId) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<HashMap<TenantId, TenantCredentials>>,
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, tenant: TenantId) -> Result<Option<TenantCredentials>> {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        Ok(map.get(&tenant).cloned())
    }

    async fn save(&self, creds: &TenantCredentials) -> Result<()> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(creds.tenant_id, creds.clone());
        Ok(())
    }

    async fn mark_requires_reauthorization(&self, tenant: TenantId) -> Result<()> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(c) = map.get_mut(&tenant) {
            c.requires_reauthorization = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: sqlx::PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Tenants with a usable connection, oldest sync first.
    pub async fn active_tenants(&self) -> Result<Vec<TenantId>> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            "SELECT tenant_id FROM tenant_credentials \
             WHERE requires_reauthorization = false \
             ORDER BY last_synced_at ASC NULLS FIRST, tenant_id",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("list tenant_credentials failed")?;
        Ok(ids.into_iter().map(TenantId).collect())
    }
}

type CredentialRow = (
    String,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    bool,
);

#[async_trait::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn load(&self, tenant: TenantId) -> Result<Option<TenantCredentials>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT access_token, upstream_tenant_id, base_currency, expires_at, requires_reauthorization \
             FROM tenant_credentials \
             WHERE tenant_id = $1",
        )
        .persistent(false)
        .bind(tenant.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("load tenant_credentials failed (tenant={tenant})"))?;

        Ok(row.map(
            |(access_token, upstream_tenant_id, base_currency, expires_at, requires_reauthorization)| {
                TenantCredentials {
                    tenant_id: tenant,
                    access_token,
                    upstream_tenant_id,
                    base_currency,
                    expires_at,
                    requires_reauthorization,
                }
            },
        ))
    }

    async fn save(&self, creds: &TenantCredentials) -> Result<()> {
        sqlx::query(
            "INSERT INTO tenant_credentials (tenant_id, access_token, upstream_tenant_id, base_currency, expires_at, requires_reauthorization, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             ON CONFLICT (tenant_id) DO UPDATE SET \
               access_token = EXCLUDED.access_token, \
               upstream_tenant_id = EXCLUDED.upstream_tenant_id, \
               base_currency = EXCLUDED.base_currency, \
               expires_at = EXCLUDED.expires_at, \
               requires_reauthorization = EXCLUDED.requires_reauthorization, \
               updated_at = now()",
        )
        .persistent(false)
        .bind(creds.tenant_id.0)
        .bind(&creds.access_token)
        .bind(&creds.upstream_tenant_id)
        .bind(&creds.base_currency)
        .bind(creds.expires_at)
        .bind(creds.requires_reauthorization)
        .execute(&self.pool)
        .await
        .context("upsert tenant_credentials failed")?;
        Ok(())
    }

    async fn mark_requires_reauthorization(&self, tenant: TenantId) -> Result<()> {
        sqlx::query(
            "UPDATE tenant_credentials SET requires_reauthorization = true, updated_at = now() \
             WHERE tenant_id = $1",
        )
        .persistent(false)
        .bind(tenant.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("flag tenant_credentials failed (tenant={tenant})"))?;
        Ok(())
    }
}
