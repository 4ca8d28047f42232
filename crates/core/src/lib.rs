pub mod cache;
pub mod credentials;
pub mod domain;
pub mod extract;
pub mod ingest;
pub mod scoring;
pub mod storage;
pub mod sync;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub accounting_api_base_url: Option<String>,
        pub accounting_api_timeout_secs: Option<u64>,
        pub rate_limit_calls_per_minute: Option<usize>,
        pub retry_max_retries: Option<u32>,
        pub retry_backoff_base_ms: Option<u64>,
        pub retry_max_backoff_secs: Option<u64>,
        pub cache_open_ttl_minutes: Option<i64>,
        pub cache_recent_ttl_hours: Option<i64>,
        pub invoice_max_pages: Option<u32>,
        pub pnl_months: Option<u32>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                accounting_api_base_url: std::env::var("ACCOUNTING_API_BASE_URL").ok(),
                accounting_api_timeout_secs: parse_env("ACCOUNTING_API_TIMEOUT_SECS")?,
                rate_limit_calls_per_minute: parse_env("RATE_LIMIT_CALLS_PER_MINUTE")?,
                retry_max_retries: parse_env("RETRY_MAX_RETRIES")?,
                retry_backoff_base_ms: parse_env("RETRY_BACKOFF_BASE_MS")?,
                retry_max_backoff_secs: parse_env("RETRY_MAX_BACKOFF_SECS")?,
                cache_open_ttl_minutes: parse_env("CACHE_OPEN_TTL_MINUTES")?,
                cache_recent_ttl_hours: parse_env("CACHE_RECENT_TTL_HOURS")?,
                invoice_max_pages: parse_env("INVOICE_MAX_PAGES")?,
                pnl_months: parse_env("PNL_MONTHS")?,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_accounting_api_base_url(&self) -> anyhow::Result<&str> {
            self.accounting_api_base_url
                .as_deref()
                .context("ACCOUNTING_API_BASE_URL is required")
        }
    }

    // Unset or blank means "use the component default"; a malformed value is a hard error.
    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(s) if !s.trim().is_empty() => {
                let v = s
                    .trim()
                    .parse::<T>()
                    .with_context(|| format!("{key} has an invalid value: {s}"))?;
                Ok(Some(v))
            }
            _ => Ok(None),
        }
    }
}
