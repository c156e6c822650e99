//! # kwcluster-serp
//!
//! Search result fetching for the keyword research pipeline.
//!
//! This crate provides:
//! - Sliding-window rate limiters (in-process and Redis-backed)
//! - The Serper.dev search provider
//! - [`SerpFetcher`]: one keyword, one ticket per attempt, bounded retry
//! - [`BatchScheduler`]: bounded-concurrency batches with ordered results

pub mod fetcher;
pub mod rate_limiter;
pub mod scheduler;
pub mod serper;

pub use fetcher::{FetchPolicy, SerpFetcher};
pub use rate_limiter::{
    build_rate_limiter, InMemoryRateLimiter, RateLimitBackend, RateLimiterConfig,
    RedisRateLimiter,
};
pub use scheduler::{BatchScheduler, BatchSink, SchedulerConfig};
pub use serper::{SerperConfig, SerperProvider};
