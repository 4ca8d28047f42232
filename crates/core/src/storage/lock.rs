use crate::domain::period::TenantId;
use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session. Best-effort guard against two workers
// syncing the same tenant at once.
const LOCK_NAMESPACE: i64 = 0x4649_4E48_4C54; // "FINHLT"

fn lock_key_for_tenant(tenant: TenantId) -> i64 {
    let bits = tenant.0.as_u128();
    let folded = ((bits >> 64) as u64) ^ (bits as u64);
    LOCK_NAMESPACE ^ (folded as i64)
}

/// Held tenant lock. Pins the pooled connection that took the lock so the unlock runs in the
/// same session.
///
/// Dropped without [`release`](Self::release), the connection is detached and closed, which
/// ends the session and frees the lock server-side instead of returning it to the pool locked.
pub struct TenantLock {
    tenant: TenantId,
    key: i64,
    conn: Option<PoolConnection<Postgres>>,
}

impl TenantLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let (tenant, key) = (self.tenant, self.key);
        let released = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await;
        match released {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(tenant_id = %tenant, key, "tenant lock was not held by this session");
                drop(conn.detach());
                Ok(())
            }
            Err(err) => {
                drop(conn.detach());
                Err(err).with_context(|| {
                    format!("failed to release tenant lock (tenant={tenant}, key={key})")
                })
            }
        }
    }
}

impl Drop for TenantLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(tenant_id = %self.tenant, key = self.key, "tenant lock dropped without release; closing its session");
            drop(conn.detach());
        }
    }
}

/// `None` when another session holds the tenant's lock.
pub async fn try_acquire_tenant_lock(
    pool: &sqlx::PgPool,
    tenant: TenantId,
) -> anyhow::Result<Option<TenantLock>> {
    let key = lock_key_for_tenant(tenant);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for tenant lock")?;
    let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire tenant lock (tenant={tenant}, key={key})"))?;
    Ok(acquired.then(|| TenantLock {
        tenant,
        key,
        conn: Some(conn),
    }))
}
