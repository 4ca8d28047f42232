use crate::config::Settings;
use crate::ingest::error::ApiError;
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        let d = Self::default();
        Self {
            max_retries: settings.retry_max_retries.unwrap_or(d.max_retries),
            backoff_base: settings
                .retry_backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(d.backoff_base),
            max_backoff: settings
                .retry_max_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(d.max_backoff),
        }
    }

    /// `base * 2^attempt`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    policy: RetryPolicy,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` until it succeeds or fails in a way that retrying cannot fix.
    ///
    /// 429 and 5xx are retried up to `max_retries` times; every other failure is
    /// returned on first sight. On exhaustion the last error is returned as-is.
    pub async fn execute_with_retry<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(err) => err,
            };

            let wait = match &err {
                ApiError::RateLimited { retry_after } => retry_after
                    .map(|d| d.min(self.policy.max_backoff))
                    .unwrap_or_else(|| self.policy.backoff(attempt)),
                ApiError::TransientServer { .. } => self.policy.backoff(attempt),
                ApiError::PermanentClient { invalid_grant: true, status, .. } => {
                    tracing::error!(endpoint, http_status = status, "credentials rejected (invalid_grant); re-authorization required, not retrying");
                    return Err(err);
                }
                other => {
                    tracing::error!(endpoint, http_status = ?other.status(), error = %other, "accounting API call failed; not retrying");
                    return Err(err);
                }
            };

            if attempt >= self.policy.max_retries {
                tracing::error!(endpoint, attempt, http_status = ?err.status(), "retry attempts exhausted");
                return Err(err);
            }

            tracing::warn!(
                endpoint,
                attempt = attempt + 1,
                max_attempts = self.policy.max_retries + 1,
                backoff_ms = wait.as_millis() as u64,
                http_status = ?err.status(),
                "accounting API call failed; retrying"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
