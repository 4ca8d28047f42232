use crate::domain::period::TenantId;
use crate::domain::snapshot::HealthScoreSnapshot;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Writes the snapshot, replacing any earlier one for the same tenant and as-of date.
pub async fn upsert_snapshot(
    pool: &sqlx::PgPool,
    snapshot: &HealthScoreSnapshot,
) -> anyhow::Result<uuid::Uuid> {
    let result = serde_json::to_value(&snapshot.result).context("encode score result failed")?;
    let financials =
        serde_json::to_value(&snapshot.financials).context("encode financials failed")?;
    let errors = serde_json::to_value(&snapshot.errors).context("encode sync errors failed")?;
    let period = serde_json::to_value(snapshot.period).context("encode period failed")?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO health_score_snapshots \
           (tenant_id, as_of_date, period, generated_at, final_score, raw_score, grade, confidence, result, financials, errors) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (tenant_id, as_of_date) DO UPDATE SET \
           period = EXCLUDED.period, \
           generated_at = EXCLUDED.generated_at, \
           final_score = EXCLUDED.final_score, \
           raw_score = EXCLUDED.raw_score, \
           grade = EXCLUDED.grade, \
           confidence = EXCLUDED.confidence, \
           result = EXCLUDED.result, \
           financials = EXCLUDED.financials, \
           errors = EXCLUDED.errors \
         RETURNING id",
    )
    .persistent(false)
    .bind(snapshot.tenant_id.0)
    .bind(snapshot.as_of_date)
    .bind(period)
    .bind(snapshot.generated_at)
    .bind(snapshot.result.final_score)
    .bind(snapshot.result.raw_score)
    .bind(snapshot.result.grade.as_str())
    .bind(snapshot.result.confidence.as_str())
    .bind(result)
    .bind(financials)
    .bind(errors)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| {
        format!(
            "upsert health_score_snapshots failed (tenant={}, as_of_date={})",
            snapshot.tenant_id, snapshot.as_of_date
        )
    })?;

    sqlx::query(
        "UPDATE tenant_credentials SET last_synced_at = $2 \
         WHERE tenant_id = $1",
    )
    .persistent(false)
    .bind(snapshot.tenant_id.0)
    .bind(snapshot.generated_at)
    .execute(&mut *tx)
    .await
    .context("update tenant_credentials.last_synced_at failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(id)
}

type SnapshotRow = (NaiveDate, Value, DateTime<Utc>, Value, Value, Value);

pub async fn load_latest_snapshot(
    pool: &sqlx::PgPool,
    tenant: TenantId,
) -> anyhow::Result<Option<HealthScoreSnapshot>> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        "SELECT as_of_date, period, generated_at, result, financials, errors \
         FROM health_score_snapshots \
         WHERE tenant_id = $1 \
         ORDER BY as_of_date DESC, generated_at DESC \
         LIMIT 1",
    )
    .persistent(false)
    .bind(tenant.0)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("load health_score_snapshots failed (tenant={tenant})"))?;

    let Some((as_of_date, period, generated_at, result, financials, errors)) = row else {
        return Ok(None);
    };

    Ok(Some(HealthScoreSnapshot {
        tenant_id: tenant,
        as_of_date,
        period: serde_json::from_value(period).context("decode stored period failed")?,
        generated_at,
        result: serde_json::from_value(result).context("decode stored score result failed")?,
        financials: serde_json::from_value(financials)
            .context("decode stored financials failed")?,
        errors: serde_json::from_value(errors).context("decode stored sync errors failed")?,
    }))
}
