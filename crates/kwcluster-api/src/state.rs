//! Shared handler state.

use std::path::PathBuf;
use std::sync::Arc;

use kwcluster_core::{defaults, EventBus, JobRepository, KeywordRepository, RateLimiter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobRepository>,
    pub keywords: Arc<dyn KeywordRepository>,
    /// Shared SERP limiter, read for load reporting.
    pub limiter: Arc<dyn RateLimiter>,
    /// Terminal job events, streamed to clients over SSE.
    pub event_bus: EventBus,
    /// Where accepted uploads are stored until their job runs.
    pub upload_dir: PathBuf,
    pub recent_jobs_limit: i64,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        keywords: Arc<dyn KeywordRepository>,
        limiter: Arc<dyn RateLimiter>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            jobs,
            keywords,
            limiter,
            event_bus,
            upload_dir: PathBuf::from(defaults::UPLOAD_DIR),
            recent_jobs_limit: defaults::RECENT_JOBS_LIMIT,
        }
    }

    /// Read `UPLOAD_DIR`.
    pub fn with_upload_dir_from_env(self) -> Self {
        match std::env::var("UPLOAD_DIR") {
            Ok(dir) if !dir.trim().is_empty() => self.with_upload_dir(dir),
            _ => self,
        }
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }
}
