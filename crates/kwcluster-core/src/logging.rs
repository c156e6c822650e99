//! Structured logging schema and field name constants for kwcluster.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Job failed, store unreachable, requires operator attention |
//! | WARN  | Recoverable issue (retry, fallback label, slow acquire) |
//! | INFO  | Lifecycle events, batch progress, phase completions |
//! | DEBUG | Decision points, per-keyword outcomes, config choices |
//! | TRACE | Per-pair comparisons, ticket admissions |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "serp", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "rate_limiter", "fetcher", "scheduler", "classifier", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "acquire", "fetch", "classify", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Owner of the job.
pub const OWNER: &str = "owner";

/// Keyword text being fetched or classified.
pub const KEYWORD: &str = "keyword";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of keyword records involved.
pub const KEYWORD_COUNT: &str = "keyword_count";

/// Zero-based batch number within a job's fetch phase.
pub const BATCH_INDEX: &str = "batch_index";

/// Tickets currently held in the rate limiter window.
pub const CURRENT_LOAD: &str = "current_load";

/// Attempt number within a retry loop (1-based).
pub const ATTEMPT: &str = "attempt";

/// Number of results returned by the SERP provider.
pub const RESULT_COUNT: &str = "result_count";

// ─── Classification fields ─────────────────────────────────────────────────

/// Shared links between two result sets.
pub const OVERLAP: &str = "overlap";

/// Records ending as primary.
pub const PRIMARY_COUNT: &str = "primary_count";

/// Records absorbed as auxiliary.
pub const AUXILIARY_COUNT: &str = "auxiliary_count";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Fetch outcome label.
pub const OUTCOME: &str = "outcome";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
