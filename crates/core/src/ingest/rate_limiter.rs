use crate::config::Settings;
use crate::domain::period::TenantId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_CALLS_PER_WINDOW: usize = 60;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_CALLS_PER_WINDOW,
            window: DEFAULT_WINDOW,
        }
    }
}

impl RateLimitConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_calls: settings
                .rate_limit_calls_per_minute
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_CALLS_PER_WINDOW),
            window: DEFAULT_WINDOW,
        }
    }
}

type Timestamps = Arc<tokio::sync::Mutex<VecDeque<Instant>>>;

/// Per-tenant sliding-window admission control.
///
/// Each tenant owns its own timestamp queue behind its own lock; the outer map
/// lock is only held long enough to look the queue up.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    tenants: Mutex<HashMap<TenantId, Timestamps>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn timestamps(&self, tenant: TenantId) -> Timestamps {
        let mut map = self.tenants.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(tenant).or_default().clone()
    }

    /// Sleeps until the tenant has room in the current window. Does not reserve it.
    pub async fn wait_if_needed(&self, tenant: TenantId) {
        let slot = self.timestamps(tenant);
        loop {
            let wait = {
                let mut q = slot.lock().await;
                match self.admission_delay(&mut q, Instant::now()) {
                    None => return,
                    Some(d) => d,
                }
            };
            tracing::info!(tenant_id = %tenant, wait_ms = wait.as_millis() as u64, "rate limit reached; waiting");
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn record_call(&self, tenant: TenantId) {
        let slot = self.timestamps(tenant);
        let mut q = slot.lock().await;
        let now = Instant::now();
        self.prune(&mut q, now);
        q.push_back(now);
    }

    /// Waits for room and records the call under one lock hold, so concurrent
    /// callers for the same tenant cannot both claim the last slot.
    pub async fn acquire(&self, tenant: TenantId) {
        let slot = self.timestamps(tenant);
        let mut q = slot.lock().await;
        loop {
            let now = Instant::now();
            match self.admission_delay(&mut q, now) {
                None => {
                    q.push_back(now);
                    return;
                }
                Some(wait) => {
                    tracing::info!(tenant_id = %tenant, wait_ms = wait.as_millis() as u64, "rate limit reached; waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Calls currently counted against the tenant's window.
    pub async fn in_flight_window(&self, tenant: TenantId) -> usize {
        let slot = self.timestamps(tenant);
        let mut q = slot.lock().await;
        self.prune(&mut q, Instant::now());
        q.len()
    }

    fn prune(&self, q: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = q.front() {
            if *front + self.config.window <= now {
                q.pop_front();
            } else {
                break;
            }
        }
    }

    fn admission_delay(&self, q: &mut VecDeque<Instant>, now: Instant) -> Option<Duration> {
        self.prune(q, now);
        if q.len() < self.config.max_calls.max(1) {
            return None;
        }
        let oldest = *q.front()?;
        Some((oldest + self.config.window).saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn tenant(n: u128) -> TenantId {
        TenantId(Uuid::from_u128(n))
    }

    fn small_limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_calls: 3,
            window: Duration::from_secs(10),
        })
    }

    fn max_in_any_window(times: &[Instant], window: Duration) -> usize {
        let mut best = 0;
        for (i, start) in times.iter().enumerate() {
            let n = times[i..].iter().filter(|t| **t < *start + window).count();
            best = best.max(n);
        }
        best
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_oldest_call_leaves_window() {
        let limiter = small_limiter();
        let t = tenant(1);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(t).await;
        }
        assert_eq!(Instant::now(), start);

        limiter.acquire(t).await;
        assert_eq!(Instant::now() - start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn tenants_do_not_share_budget() {
        let limiter = small_limiter();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(tenant(1)).await;
        }
        limiter.acquire(tenant(2)).await;
        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.in_flight_window(tenant(1)).await, 3);
        assert_eq!(limiter.in_flight_window(tenant(2)).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_then_record_pair_respects_limit() {
        let limiter = small_limiter();
        let t = tenant(7);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.wait_if_needed(t).await;
            limiter.record_call(t).await;
        }
        assert_eq!(Instant::now() - start, Duration::from_secs(10));
        assert_eq!(limiter.in_flight_window(t).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_window() {
        let limiter = Arc::new(small_limiter());
        let t = tenant(3);
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(t).await;
                Instant::now()
            }));
        }
        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();
        assert!(max_in_any_window(&times, Duration::from_secs(10)) <= 3);
    }

    proptest! {
        #[test]
        fn never_admits_more_than_limit_in_trailing_window(
            calls in proptest::collection::vec((0u128..3, 0u64..4_000), 1..120)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let per_tenant = rt.block_on(async move {
                let limiter = Arc::new(small_limiter());
                let mut handles = Vec::new();
                for tenant_idx in 0u128..3 {
                    let delays: Vec<u64> = calls
                        .iter()
                        .filter(|(t, _)| *t == tenant_idx)
                        .map(|(_, d)| *d)
                        .collect();
                    let limiter = limiter.clone();
                    handles.push(tokio::spawn(async move {
                        let mut times = Vec::new();
                        for delay in delays {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                            limiter.acquire(tenant(tenant_idx)).await;
                            times.push(Instant::now());
                        }
                        times
                    }));
                }
                let mut out = Vec::new();
                for h in handles {
                    out.push(h.await.unwrap());
                }
                out
            });

            for times in per_tenant {
                prop_assert!(max_in_any_window(&times, Duration::from_secs(10)) <= 3);
            }
        }
    }
}
