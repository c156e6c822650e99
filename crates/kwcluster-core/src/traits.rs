//! Core traits for kwcluster abstractions.
//!
//! These traits define the seams between the pipeline and its storage and
//! network collaborators, enabling pluggable backends and testability.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, SerpError};
use crate::models::*;

// =============================================================================
// JOB REPOSITORY TRAITS
// =============================================================================

/// Repository for research job lifecycle operations.
///
/// Every status transition is a conditional update: methods returning `bool`
/// report whether this caller performed the transition.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Create a new job in `pending`.
    async fn create(&self, req: CreateJobRequest) -> Result<Job>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Atomically claim the oldest pending job, moving it to `running`.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Move a specific job from `pending` to `running`.
    async fn try_start(&self, job_id: Uuid) -> Result<bool>;

    /// Move a `running` job to `completed`.
    async fn complete(&self, job_id: Uuid) -> Result<bool>;

    /// Move a non-terminal job to `failed` with an error message.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<bool>;

    /// Running jobs for an owner, oldest first.
    async fn list_running_for_owner(&self, owner: &str) -> Result<Vec<Job>>;

    /// Most recent terminal jobs for an owner, newest first.
    async fn list_recent_terminal_for_owner(&self, owner: &str, limit: i64) -> Result<Vec<Job>>;

    /// Jobs that entered `running` before `started_before`.
    async fn list_stale_running(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>>;
}

/// Repository for keyword records belonging to a job.
#[async_trait]
pub trait KeywordRepository: Send + Sync {
    /// Number of records already stored for a job (duplicate-run guard).
    async fn count_for_job(&self, job_id: Uuid) -> Result<i64>;

    /// Insert freshly parsed records.
    async fn insert_batch(&self, records: &[KeywordRecord]) -> Result<()>;

    /// Write fetch results back to their records.
    async fn record_fetch_results(&self, results: &[(Uuid, FetchResult)]) -> Result<()>;

    /// All records for a job ordered by `sequence_index`.
    async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<KeywordRecord>>;

    /// Persist classification, merged volume, and merged keywords.
    async fn save_classification(&self, records: &[KeywordRecord]) -> Result<()>;

    /// Store intent labels for one record.
    async fn set_intent(&self, record_id: Uuid, labels: &IntentLabels) -> Result<()>;

    /// Primary records for a job ordered by `sequence_index`.
    async fn list_primary_for_job(&self, job_id: Uuid) -> Result<Vec<KeywordRecord>>;

    /// Delete every record of a job, returning the number removed.
    async fn delete_for_job(&self, job_id: Uuid) -> Result<u64>;
}

// =============================================================================
// COLLABORATOR TRAITS
// =============================================================================

/// Search engine results provider.
#[async_trait]
pub trait SerpProvider: Send + Sync {
    /// Ordered organic results for one query.
    async fn search(
        &self,
        query: &str,
        locale: &SearchLocale,
    ) -> std::result::Result<Vec<SerpHit>, SerpError>;
}

/// Sliding-window admission gate shared by every concurrent fetch.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Admit `tickets` atomically, waiting up to `timeout`.
    ///
    /// Returns `false` on timeout; never errors.
    async fn acquire(&self, tickets: u32, timeout: Duration) -> bool;

    /// Tickets granted within the trailing window.
    async fn current_load(&self) -> Result<u32>;

    /// Configured ceiling per window.
    fn max_qps(&self) -> u32;
}

/// Keyword intent classifier.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Intent and type labels for a keyword and its result links.
    async fn classify(&self, keyword: &str, links: &[String]) -> Result<IntentLabels>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// Fire-and-forget sink for job lifecycle events.
pub trait JobNotifier: Send + Sync {
    fn notify(&self, event: JobEvent);
}
