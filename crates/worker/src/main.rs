use anyhow::Context;
use clap::Parser;
use finhealth_core::cache::store::{CacheStore, MemoryCacheStore};
use finhealth_core::cache::{CacheService, FreshnessPolicy};
use finhealth_core::credentials::PgCredentialStore;
use finhealth_core::domain::period::{FinancialPeriod, TenantId};
use finhealth_core::ingest::client::HttpAccountingApi;
use finhealth_core::ingest::fetchers::{InvoiceFetchOptions, ReportFetchers};
use finhealth_core::ingest::orchestrator::Orchestrator;
use finhealth_core::ingest::rate_limiter::{RateLimitConfig, RateLimiter};
use finhealth_core::ingest::retry::{RetryHandler, RetryPolicy};
use finhealth_core::storage::cache_entries::PgCacheStore;
use finhealth_core::sync::SyncService;
use finhealth_core::time::clock::{Clock, SystemClock};
use finhealth_core::time::periods::{resolve_as_of_date, trailing_months_start};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PNL_MONTHS: u32 = 12;

#[derive(Debug, Parser)]
#[command(name = "finhealth_worker")]
struct Args {
    /// Tenant to sync (repeatable). Defaults to every tenant with a usable connection.
    #[arg(long = "tenant")]
    tenants: Vec<uuid::Uuid>,

    /// Period end (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Calendar months of P&L history ending at the as-of date.
    #[arg(long)]
    months: Option<u32>,

    /// Fetch and score, but write nothing to the database (report cache included).
    #[arg(long)]
    dry_run: bool,

    /// Ignore cached reports and refetch everything.
    #[arg(long)]
    force_refresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = finhealth_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref(), clock.now())?;
    let months = args
        .months
        .or(settings.pnl_months)
        .unwrap_or(DEFAULT_PNL_MONTHS)
        .max(1);
    let period = FinancialPeriod::range(trailing_months_start(as_of_date, months), as_of_date)
        .context("as-of date does not form a valid sync period")?;

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    if !args.dry_run {
        finhealth_core::storage::migrate(&pool).await?;
    }

    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let cache_store: Arc<dyn CacheStore> = if args.dry_run {
        Arc::new(MemoryCacheStore::default())
    } else {
        Arc::new(PgCacheStore::new(pool.clone()))
    };

    let fetchers = ReportFetchers::new(
        Arc::new(HttpAccountingApi::from_settings(&settings)?),
        Arc::new(RateLimiter::new(RateLimitConfig::from_settings(&settings))),
        RetryHandler::new(RetryPolicy::from_settings(&settings)),
        InvoiceFetchOptions::from_settings(&settings),
    );
    let cache = CacheService::new(
        cache_store,
        clock.clone(),
        FreshnessPolicy::from_settings(&settings),
    );
    let sync = SyncService::new(
        Orchestrator::new(fetchers, cache, clock.clone()),
        credentials.clone(),
        clock,
    );

    let tenants: Vec<TenantId> = if args.tenants.is_empty() {
        credentials.active_tenants().await?
    } else {
        args.tenants.iter().copied().map(TenantId).collect()
    };

    tracing::info!(
        %as_of_date,
        %period,
        tenants = tenants.len(),
        dry_run = args.dry_run,
        force_refresh = args.force_refresh,
        "health score run started"
    );

    let mut failed = 0usize;
    for tenant in tenants {
        if let Err(err) = run_tenant(&pool, &sync, tenant, period, &args).await {
            failed += 1;
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(tenant_id = %tenant, error = %format!("{err:#}"), "tenant sync failed");
        }
    }

    if failed > 0 {
        tracing::warn!(failed, "health score run finished with failures");
    } else {
        tracing::info!("health score run finished");
    }
    Ok(())
}

async fn run_tenant(
    pool: &sqlx::PgPool,
    sync: &SyncService,
    tenant: TenantId,
    period: FinancialPeriod,
    args: &Args,
) -> anyhow::Result<()> {
    // The lock pins one pooled connection until released.
    let Some(lock) = finhealth_core::storage::lock::try_acquire_tenant_lock(pool, tenant).await?
    else {
        tracing::warn!(tenant_id = %tenant, "tenant lock not acquired; another sync in progress");
        return Ok(());
    };

    let result = sync_and_persist(pool, sync, tenant, period, args).await;

    if let Err(err) = lock.release().await {
        tracing::warn!(tenant_id = %tenant, error = %err, "failed to release tenant lock");
    }
    result
}

async fn sync_and_persist(
    pool: &sqlx::PgPool,
    sync: &SyncService,
    tenant: TenantId,
    period: FinancialPeriod,
    args: &Args,
) -> anyhow::Result<()> {
    let snapshot = sync.sync_tenant(tenant, period, args.force_refresh).await?;

    if args.dry_run {
        let summary = serde_json::json!({
            "tenant_id": snapshot.tenant_id,
            "as_of_date": snapshot.as_of_date,
            "final_score": snapshot.result.final_score,
            "grade": snapshot.result.grade,
            "confidence": snapshot.result.confidence,
            "errors": snapshot.errors,
        });
        tracing::info!(tenant_id = %tenant, dry_run = true, summary = %summary, "health score computed (not persisted)");
        return Ok(());
    }

    let snapshot_id = finhealth_core::storage::health_scores::upsert_snapshot(pool, &snapshot).await?;
    tracing::info!(
        tenant_id = %tenant,
        %snapshot_id,
        final_score = snapshot.result.final_score,
        grade = snapshot.result.grade.as_str(),
        "persisted health score snapshot"
    );
    Ok(())
}

fn init_sentry(settings: &finhealth_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
