//! Centralized default constants for kwcluster.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic numbers.
//! Every `from_env()` constructor falls back to the value here.

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Global ceiling on outbound SERP requests per trailing second.
///
/// The provider allows 50 QPS; 45 leaves headroom for clock skew between workers.
pub const SERP_MAX_QPS: u32 = 45;

/// Sliding window length in milliseconds.
pub const RATE_WINDOW_MS: u64 = 1_000;

/// Pause between admission attempts while the window is full.
pub const RATE_POLL_INTERVAL_MS: u64 = 50;

/// Pause after a shared-store error before retrying admission.
pub const RATE_ERROR_BACKOFF_MS: u64 = 100;

/// Redis key holding the sliding-window ticket log.
pub const RATE_LIMIT_KEY: &str = "serper_rate_limiter";

/// Default Redis URL for the shared ticket log.
pub const REDIS_URL: &str = "redis://localhost:6379";

// =============================================================================
// SERP FETCHING
// =============================================================================

/// Default Serper endpoint.
pub const SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Number of organic results requested and required per keyword.
pub const SERP_RESULT_COUNT: usize = 10;

/// Maximum wait for a rate-limiter ticket before giving up on a keyword.
pub const SERP_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Network attempts per keyword (first try plus retries).
pub const SERP_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff after HTTP 429 (doubles per attempt).
pub const SERP_RATE_LIMIT_BACKOFF_MS: u64 = 1_000;

/// Fixed delay after a transient network/API error.
pub const SERP_TRANSIENT_BACKOFF_MS: u64 = 1_000;

/// HTTP timeout for one SERP request.
pub const SERP_TIMEOUT_SECS: u64 = 30;

/// Default Google country code.
pub const SERP_GL: &str = "ir";

/// Default Google interface language.
pub const SERP_HL: &str = "fa";

// =============================================================================
// BATCH SCHEDULING
// =============================================================================

/// Keywords fetched concurrently per batch.
pub const BATCH_SIZE: usize = 50;

/// Pause between batches to avoid bursting right after a window reset.
pub const BATCH_PAUSE_MS: u64 = 500;

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Minimum shared result links for two keywords to be merged.
pub const OVERLAP_THRESHOLD: usize = 6;

/// Separator used when rendering result links as a single cell.
pub const LINK_SEPARATOR: &str = " -------------- ";

/// Separator between auxiliary keywords in the export.
pub const AKW_SEPARATOR: &str = " - ";

// =============================================================================
// INTENT CLASSIFICATION
// =============================================================================

/// Label stored when intent classification is skipped or fails.
pub const NOT_APPLICABLE: &str = "N/A";

/// Pause between intent-classifier calls.
pub const AI_REQUEST_INTERVAL_MS: u64 = 4_000;

/// Default chat model for intent classification.
pub const AI_GEN_MODEL: &str = "gpt-4o-mini";

/// HTTP timeout for one intent-classifier call.
pub const AI_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Polling interval in milliseconds when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 1_000;

/// Maximum concurrent pipeline runs per worker process.
pub const JOB_MAX_CONCURRENT: usize = 2;

/// Per-job wall clock limit.
pub const JOB_TIMEOUT_SECS: u64 = 4 * 60 * 60;

/// A job still `running` after this long is considered abandoned.
pub const JOB_STALE_AFTER_SECS: u64 = 6 * 60 * 60;

/// How often the worker sweeps for abandoned jobs.
pub const JOB_REAP_INTERVAL_SECS: u64 = 300;

/// Terminal jobs returned by the status query.
pub const RECENT_JOBS_LIMIT: i64 = 10;

/// Event bus buffer capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// INPUT
// =============================================================================

/// Largest accepted search volume per input row.
///
/// Keeps merged totals far from `i64` overflow even when every row of a large
/// file collapses into one primary.
pub const MAX_SEARCH_VOLUME: i64 = 1_000_000_000_000;

// =============================================================================
// SERVER
// =============================================================================

/// Directory where uploaded keyword files are stored.
pub const UPLOAD_DIR: &str = "./uploads";

/// Default PostgreSQL URL.
pub const DATABASE_URL: &str = "postgres://localhost/kwcluster";

/// Pool size. Each running pipeline holds at most one connection at a time.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Longest wait for a pooled connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;
