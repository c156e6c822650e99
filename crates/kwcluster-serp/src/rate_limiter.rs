//! Sliding-window rate limiting for outbound SERP requests.
//!
//! Both limiters keep a log of granted tickets stamped with their admission
//! time. An `acquire` purges entries older than the window, then admits the
//! requested tickets all-or-nothing if they fit under `max_qps`; otherwise it
//! polls until admitted or the timeout elapses.
//!
//! - [`InMemoryRateLimiter`] coordinates tasks within one process.
//! - [`RedisRateLimiter`] coordinates every worker sharing a Redis instance.
//!   The purge, count and insert run inside one Lua script, so the check and
//!   the increment are a single atomic step on the server.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RATE_LIMIT_BACKEND`: `redis` (default) or `memory`
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
//! - `SERP_MAX_QPS`: tickets per trailing second (default: 45)
//! - `SERP_RATE_LIMIT_KEY`: sorted-set key (default: serper_rate_limiter)

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use kwcluster_core::{defaults, Error, RateLimiter, Result};

/// Which shared store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Redis,
    Memory,
}

impl RateLimitBackend {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "local" => RateLimitBackend::Memory,
            _ => RateLimitBackend::Redis,
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub backend: RateLimitBackend,
    pub redis_url: String,
    pub key: String,
    pub max_qps: u32,
    pub window: Duration,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            backend: RateLimitBackend::Redis,
            redis_url: defaults::REDIS_URL.to_string(),
            key: defaults::RATE_LIMIT_KEY.to_string(),
            max_qps: defaults::SERP_MAX_QPS,
            window: Duration::from_millis(defaults::RATE_WINDOW_MS),
            poll_interval: Duration::from_millis(defaults::RATE_POLL_INTERVAL_MS),
            error_backoff: Duration::from_millis(defaults::RATE_ERROR_BACKOFF_MS),
        }
    }
}

impl RateLimiterConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(backend) = std::env::var("RATE_LIMIT_BACKEND") {
            config.backend = RateLimitBackend::parse(&backend);
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(key) = std::env::var("SERP_RATE_LIMIT_KEY") {
            config.key = key;
        }
        if let Some(qps) = std::env::var("SERP_MAX_QPS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_qps = qps;
        }
        config
    }

    pub fn with_backend(mut self, backend: RateLimitBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_max_qps(mut self, max_qps: u32) -> Self {
        self.max_qps = max_qps;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Build the configured limiter.
pub async fn build_rate_limiter(config: RateLimiterConfig) -> Result<Arc<dyn RateLimiter>> {
    match config.backend {
        RateLimitBackend::Memory => {
            info!(
                subsystem = "serp",
                component = "rate_limiter",
                max_qps = config.max_qps,
                "Using in-process rate limiter"
            );
            Ok(Arc::new(InMemoryRateLimiter::new(config)))
        }
        RateLimitBackend::Redis => Ok(Arc::new(RedisRateLimiter::connect(config).await?)),
    }
}

/// Shared polling loop: try admission until it succeeds or `timeout` elapses.
async fn acquire_with<F, Fut>(
    tickets: u32,
    max_qps: u32,
    timeout: Duration,
    poll_interval: Duration,
    error_backoff: Duration,
    mut try_admit: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    if tickets > max_qps {
        warn!(
            subsystem = "serp",
            component = "rate_limiter",
            op = "acquire",
            tickets,
            max_qps,
            "Requested more tickets than the window can ever hold"
        );
        return false;
    }

    let deadline = Instant::now() + timeout;
    loop {
        let pause = match try_admit().await {
            Ok(true) => return true,
            Ok(false) => poll_interval,
            Err(e) => {
                warn!(
                    subsystem = "serp",
                    component = "rate_limiter",
                    op = "acquire",
                    error = %e,
                    "Rate limiter store error, backing off"
                );
                error_backoff
            }
        };

        let now = Instant::now();
        if now >= deadline {
            debug!(
                subsystem = "serp",
                component = "rate_limiter",
                op = "acquire",
                tickets,
                timeout_ms = timeout.as_millis() as u64,
                "Rate limiter acquire timed out"
            );
            return false;
        }
        tokio::time::sleep(pause.min(deadline - now)).await;
    }
}

// =============================================================================
// IN-PROCESS LIMITER
// =============================================================================

/// Sliding-window limiter for tasks sharing one process.
pub struct InMemoryRateLimiter {
    max_qps: u32,
    window: Duration,
    poll_interval: Duration,
    log: Mutex<VecDeque<Instant>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            max_qps: config.max_qps,
            window: config.window,
            poll_interval: config.poll_interval,
            log: Mutex::new(VecDeque::new()),
        }
    }

    fn purge(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&oldest) = log.front() {
            if now.duration_since(oldest) >= window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    async fn try_admit(&self, tickets: u32) -> bool {
        let mut log = self.log.lock().await;
        let now = Instant::now();
        Self::purge(&mut log, now, self.window);
        if log.len() as u32 + tickets <= self.max_qps {
            log.extend(std::iter::repeat(now).take(tickets as usize));
            trace!(
                subsystem = "serp",
                component = "rate_limiter",
                current_load = log.len(),
                "Tickets admitted"
            );
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn acquire(&self, tickets: u32, timeout: Duration) -> bool {
        acquire_with(
            tickets,
            self.max_qps,
            timeout,
            self.poll_interval,
            self.poll_interval,
            || async { Ok(self.try_admit(tickets).await) },
        )
        .await
    }

    async fn current_load(&self) -> Result<u32> {
        let mut log = self.log.lock().await;
        Self::purge(&mut log, Instant::now(), self.window);
        Ok(log.len() as u32)
    }

    fn max_qps(&self) -> u32 {
        self.max_qps
    }
}

// =============================================================================
// REDIS LIMITER
// =============================================================================

/// Purge, count and conditionally insert in one server-side step.
///
/// Scores are server microseconds from `TIME`, so workers with skewed clocks
/// still share one timeline.
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local max_qps = tonumber(ARGV[1])
local tickets = tonumber(ARGV[2])
local window_us = tonumber(ARGV[3])
local token = ARGV[4]
local ttl_ms = tonumber(ARGV[5])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
redis.call('ZREMRANGEBYSCORE', key, 0, now - window_us)
local current = redis.call('ZCARD', key)
if current + tickets <= max_qps then
  for i = 1, tickets do
    redis.call('ZADD', key, now, token .. ':' .. i)
  end
  redis.call('PEXPIRE', key, ttl_ms)
  return 1
end
return 0
"#;

const LOAD_SCRIPT: &str = r#"
local key = KEYS[1]
local window_us = tonumber(ARGV[1])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000000 + tonumber(t[2])
redis.call('ZREMRANGEBYSCORE', key, 0, now - window_us)
return redis.call('ZCARD', key)
"#;

/// Sliding-window limiter shared across processes through Redis.
pub struct RedisRateLimiter {
    connection: ConnectionManager,
    key: String,
    max_qps: u32,
    window: Duration,
    poll_interval: Duration,
    error_backoff: Duration,
    admit: redis::Script,
    load: redis::Script,
}

impl RedisRateLimiter {
    /// Connect to Redis and prepare the admission scripts.
    pub async fn connect(config: RateLimiterConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::RateLimiter(format!("Failed to connect to Redis: {}", e)))?;

        info!(
            subsystem = "serp",
            component = "rate_limiter",
            max_qps = config.max_qps,
            key = %config.key,
            "Redis rate limiter connected"
        );

        Ok(Self {
            connection,
            key: config.key,
            max_qps: config.max_qps,
            window: config.window,
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
            admit: redis::Script::new(ADMIT_SCRIPT),
            load: redis::Script::new(LOAD_SCRIPT),
        })
    }

    fn window_us(&self) -> u64 {
        self.window.as_micros() as u64
    }

    async fn try_admit(&self, tickets: u32, token: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let ttl_ms = (self.window.as_millis() as u64) * 2;
        let admitted: i32 = self
            .admit
            .key(&self.key)
            .arg(self.max_qps)
            .arg(tickets)
            .arg(self.window_us())
            .arg(token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::RateLimiter(e.to_string()))?;
        Ok(admitted == 1)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn acquire(&self, tickets: u32, timeout: Duration) -> bool {
        let token = Uuid::new_v4().to_string();
        acquire_with(
            tickets,
            self.max_qps,
            timeout,
            self.poll_interval,
            self.error_backoff,
            || self.try_admit(tickets, &token),
        )
        .await
    }

    async fn current_load(&self) -> Result<u32> {
        let mut conn = self.connection.clone();
        let load: u32 = self
            .load
            .key(&self.key)
            .arg(self.window_us())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::RateLimiter(e.to_string()))?;
        Ok(load)
    }

    fn max_qps(&self) -> u32 {
        self.max_qps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limiter(max_qps: u32) -> Arc<InMemoryRateLimiter> {
        Arc::new(InMemoryRateLimiter::new(
            RateLimiterConfig::default()
                .with_backend(RateLimitBackend::Memory)
                .with_max_qps(max_qps),
        ))
    }

    /// Largest number of admissions inside any half-open window `[t, t + window)`.
    fn max_in_any_window(mut admitted: Vec<Instant>, window: Duration) -> usize {
        admitted.sort();
        let mut best = 0;
        for (i, start) in admitted.iter().enumerate() {
            let count = admitted[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            best = best.max(count);
        }
        best
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(RateLimitBackend::parse("memory"), RateLimitBackend::Memory);
        assert_eq!(RateLimitBackend::parse("REDIS"), RateLimitBackend::Redis);
        assert_eq!(RateLimitBackend::parse("other"), RateLimitBackend::Redis);
    }

    #[test]
    fn test_config_defaults() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_qps, 45);
        assert_eq!(config.key, "serper_rate_limiter");
        assert_eq!(config.window, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_max_then_blocks() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.acquire(1, Duration::ZERO).await);
        }
        assert!(!limiter.acquire(1, Duration::ZERO).await);
        assert_eq!(limiter.current_load().await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_frees_capacity() {
        let limiter = limiter(2);
        assert!(limiter.acquire(2, Duration::ZERO).await);

        let start = Instant::now();
        assert!(limiter.acquire(1, Duration::from_secs(5)).await);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_false_without_admitting() {
        let limiter = limiter(1);
        assert!(limiter.acquire(1, Duration::ZERO).await);

        let start = Instant::now();
        assert!(!limiter.acquire(1, Duration::from_millis(300)).await);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(limiter.current_load().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_ticket_is_all_or_nothing() {
        let limiter = limiter(5);
        assert!(limiter.acquire(4, Duration::ZERO).await);
        assert!(!limiter.acquire(2, Duration::ZERO).await);
        assert_eq!(limiter.current_load().await.unwrap(), 4);
        assert!(limiter.acquire(1, Duration::ZERO).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_more_tickets_than_capacity_fails_fast() {
        let limiter = limiter(5);
        let start = Instant::now();
        assert!(!limiter.acquire(6, Duration::from_secs(10)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_never_exceeds_max_in_any_window() {
        let max_qps = 45;
        let extra = 20;
        let limiter = limiter(max_qps);
        let timeouts = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..(max_qps as usize + extra) {
            let limiter = limiter.clone();
            let timeouts = timeouts.clone();
            handles.push(tokio::spawn(async move {
                if limiter.acquire(1, Duration::from_secs(5)).await {
                    Some(Instant::now())
                } else {
                    timeouts.fetch_add(1, Ordering::SeqCst);
                    None
                }
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            if let Some(at) = handle.await.unwrap() {
                admitted.push(at);
            }
        }

        assert_eq!(admitted.len() + timeouts.load(Ordering::SeqCst), 65);
        assert_eq!(admitted.len(), 65, "all callers fit within the timeout");
        assert!(max_in_any_window(admitted, Duration::from_secs(1)) <= max_qps as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_with_short_timeout_rejects_overflow() {
        let limiter = limiter(10);
        let mut handles = Vec::new();
        for _ in 0..15 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(1, Duration::from_millis(200)).await
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
    }
}
