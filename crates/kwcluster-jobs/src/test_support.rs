//! Fixtures shared by the pipeline and worker tests.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use kwcluster_core::{
    CreateJobRequest, Job, JobEvent, JobNotifier, JobRepository, JobStatus, SearchLocale,
    SerpError, SerpHit, SerpProvider,
};
use kwcluster_db::MemoryStore;
use kwcluster_serp::{
    BatchScheduler, FetchPolicy, InMemoryRateLimiter, RateLimiterConfig, SchedulerConfig,
    SerpFetcher,
};

use crate::pipeline::{PipelineConfig, PipelineOrchestrator};

/// Canned search results per keyword; unknown keywords get no results.
#[derive(Default)]
pub struct FixtureProvider {
    results: HashMap<String, Vec<SerpHit>>,
}

impl FixtureProvider {
    /// Results `https://siteN.example` for every `N` in `sites`.
    pub fn with_links(mut self, keyword: &str, sites: Range<u32>) -> Self {
        let hits = sites
            .map(|n| SerpHit {
                url: format!("https://site{n}.example"),
                title: format!("Site {n}"),
            })
            .collect();
        self.results.insert(keyword.to_string(), hits);
        self
    }
}

#[async_trait]
impl SerpProvider for FixtureProvider {
    async fn search(
        &self,
        query: &str,
        _locale: &SearchLocale,
    ) -> std::result::Result<Vec<SerpHit>, SerpError> {
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

/// Never answers.
pub struct HangingProvider;

#[async_trait]
impl SerpProvider for HangingProvider {
    async fn search(
        &self,
        _query: &str,
        _locale: &SearchLocale,
    ) -> std::result::Result<Vec<SerpHit>, SerpError> {
        std::future::pending().await
    }
}

/// Panics on every search.
pub struct PanickingProvider;

#[async_trait]
impl SerpProvider for PanickingProvider {
    async fn search(
        &self,
        _query: &str,
        _locale: &SearchLocale,
    ) -> std::result::Result<Vec<SerpHit>, SerpError> {
        panic!("provider exploded")
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<JobEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl JobNotifier for RecordingNotifier {
    fn notify(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub events: Arc<RecordingNotifier>,
    provider: Arc<dyn SerpProvider>,
    dir: TempDir,
}

impl Harness {
    pub fn new(provider: FixtureProvider) -> Self {
        Self::with_provider(Arc::new(provider))
    }

    pub fn with_provider(provider: Arc<dyn SerpProvider>) -> Self {
        Self {
            store: MemoryStore::new(),
            events: Arc::new(RecordingNotifier::default()),
            provider,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Store `csv` as an upload and create a pending job for it.
    pub async fn submit(&self, csv: &str, ai: bool) -> Job {
        let path = self.dir.path().join(format!("{}.csv", Uuid::new_v4()));
        std::fs::write(&path, csv).unwrap();
        self.store
            .create(CreateJobRequest::new(
                "alice",
                "keywords.csv",
                None,
                path.to_string_lossy(),
                ai,
            ))
            .await
            .unwrap()
    }

    pub fn pipeline(&self) -> PipelineOrchestrator {
        let limiter = InMemoryRateLimiter::new(RateLimiterConfig::default().with_max_qps(1_000));
        let fetcher = SerpFetcher::new(
            self.provider.clone(),
            Arc::new(limiter),
            SearchLocale::default(),
            FetchPolicy::default(),
        );
        let scheduler = BatchScheduler::new(
            fetcher,
            SchedulerConfig::default()
                .with_batch_size(2)
                .with_batch_pause(Duration::ZERO),
        );
        let store = Arc::new(self.store.clone());
        PipelineOrchestrator::new(store.clone(), store, scheduler, self.events.clone())
            .with_config(PipelineConfig::default().with_ai_request_interval(Duration::ZERO))
    }

    pub async fn wait_for_status(&self, job_id: Uuid, status: JobStatus) -> bool {
        for _ in 0..500 {
            if let Ok(Some(job)) = self.store.get(job_id).await {
                if job.status == status {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
