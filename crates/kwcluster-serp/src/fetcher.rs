//! Per-keyword fetch with rate limiting and bounded retry.
//!
//! Failures never escape as errors: every path ends in a [`FetchResult`]
//! whose [`FetchOutcome`] says what happened.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use kwcluster_core::{
    defaults, FetchOutcome, FetchResult, RateLimiter, SearchLocale, SerpError, SerpProvider,
};

/// Retry and admission policy for one keyword.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Longest wait for a rate-limiter ticket per attempt.
    pub acquire_timeout: Duration,
    /// Network attempts including the first.
    pub max_attempts: u32,
    /// Base delay after HTTP 429, doubled per attempt.
    pub rate_limit_backoff: Duration,
    /// Fixed delay after any other provider error.
    pub transient_backoff: Duration,
    /// Results needed for the keyword to count as fetched.
    pub required_results: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(defaults::SERP_ACQUIRE_TIMEOUT_SECS),
            max_attempts: defaults::SERP_MAX_ATTEMPTS,
            rate_limit_backoff: Duration::from_millis(defaults::SERP_RATE_LIMIT_BACKOFF_MS),
            transient_backoff: Duration::from_millis(defaults::SERP_TRANSIENT_BACKOFF_MS),
            required_results: defaults::SERP_RESULT_COUNT,
        }
    }
}

impl FetchPolicy {
    /// Create policy from environment variables.
    ///
    /// Reads `SERP_ACQUIRE_TIMEOUT_SECS`, `SERP_MAX_ATTEMPTS`, `SERP_RESULT_COUNT`.
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Some(secs) = env_parse::<u64>("SERP_ACQUIRE_TIMEOUT_SECS") {
            policy.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("SERP_MAX_ATTEMPTS") {
            policy.max_attempts = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("SERP_RESULT_COUNT") {
            policy = policy.with_required_results(n);
        }
        policy
    }

    /// At least one result, so an empty page is never a success.
    pub fn with_required_results(mut self, n: usize) -> Self {
        self.required_results = n.max(1);
        self
    }

    /// Delay before the attempt following `attempt` (1-based).
    fn backoff(&self, attempt: u32, error: &SerpError) -> Duration {
        if error.is_rate_limited() {
            self.rate_limit_backoff * 2u32.saturating_pow(attempt - 1)
        } else {
            self.transient_backoff
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Fetches the top results for one keyword through the shared rate limiter.
#[derive(Clone)]
pub struct SerpFetcher {
    provider: Arc<dyn SerpProvider>,
    limiter: Arc<dyn RateLimiter>,
    locale: SearchLocale,
    policy: FetchPolicy,
}

impl SerpFetcher {
    pub fn new(
        provider: Arc<dyn SerpProvider>,
        limiter: Arc<dyn RateLimiter>,
        locale: SearchLocale,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            locale,
            policy,
        }
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Fetch one keyword. Every attempt takes its own rate-limiter ticket.
    pub async fn fetch(&self, keyword: &str) -> FetchResult {
        let mut attempt = 0;
        loop {
            attempt += 1;

            if !self.limiter.acquire(1, self.policy.acquire_timeout).await {
                warn!(
                    subsystem = "serp",
                    component = "fetcher",
                    op = "fetch",
                    keyword,
                    attempt,
                    "Rate limiter ticket not granted in time"
                );
                return FetchResult::no_result(FetchOutcome::RateLimited);
            }

            match self.provider.search(keyword, &self.locale).await {
                Ok(mut hits) if hits.len() >= self.policy.required_results => {
                    hits.truncate(self.policy.required_results);
                    debug!(
                        subsystem = "serp",
                        component = "fetcher",
                        keyword,
                        attempt,
                        outcome = "success",
                        "Keyword fetched"
                    );
                    return FetchResult::success(hits);
                }
                Ok(hits) => {
                    debug!(
                        subsystem = "serp",
                        component = "fetcher",
                        keyword,
                        result_count = hits.len(),
                        outcome = "insufficient",
                        "Partial result set discarded"
                    );
                    return FetchResult::no_result(FetchOutcome::Insufficient);
                }
                Err(e) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            subsystem = "serp",
                            component = "fetcher",
                            keyword,
                            attempt,
                            error = %e,
                            outcome = "exhausted",
                            "Retries exhausted"
                        );
                        return FetchResult::no_result(FetchOutcome::Exhausted);
                    }
                    let delay = self.policy.backoff(attempt, &e);
                    warn!(
                        subsystem = "serp",
                        component = "fetcher",
                        keyword,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Search failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use kwcluster_core::{RateLimiter, Result, SearchLocale, SerpError, SerpHit, SerpProvider};

    pub fn hits(prefix: &str, n: usize) -> Vec<SerpHit> {
        (0..n)
            .map(|i| SerpHit {
                url: format!("https://{prefix}.example/{i}"),
                title: format!("{prefix} {i}"),
            })
            .collect()
    }

    /// Provider answering from per-keyword scripted responses; repeats the last one.
    #[derive(Default)]
    pub struct ScriptedProvider {
        scripts: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<SerpHit>, SerpError>>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedProvider {
        pub fn with(
            self,
            keyword: &str,
            responses: Vec<std::result::Result<Vec<SerpHit>, SerpError>>,
        ) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(keyword.to_string(), responses.into());
            self
        }
    }

    #[async_trait]
    impl SerpProvider for ScriptedProvider {
        async fn search(
            &self,
            query: &str,
            _locale: &SearchLocale,
        ) -> std::result::Result<Vec<SerpHit>, SerpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts
                .get_mut(query)
                .ok_or_else(|| SerpError::Status(404))?;
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            }
        }
    }

    /// Limiter that always admits (or never does) and counts tickets.
    pub struct CountingLimiter {
        pub admit: bool,
        pub granted: AtomicU32,
    }

    impl CountingLimiter {
        pub fn open() -> Self {
            Self {
                admit: true,
                granted: AtomicU32::new(0),
            }
        }

        pub fn closed() -> Self {
            Self {
                admit: false,
                granted: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn acquire(&self, tickets: u32, timeout: Duration) -> bool {
            if self.admit {
                self.granted.fetch_add(tickets, Ordering::SeqCst);
                true
            } else {
                tokio::time::sleep(timeout).await;
                false
            }
        }

        async fn current_load(&self) -> Result<u32> {
            Ok(self.granted.load(Ordering::SeqCst))
        }

        fn max_qps(&self) -> u32 {
            45
        }
    }
}
