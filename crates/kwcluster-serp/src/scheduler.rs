//! Batch scheduling of keyword fetches.
//!
//! Keywords are split into fixed-size batches. Fetches within a batch run
//! concurrently and queue on the rate limiter; batches run one after another
//! with a short pause so a fresh window does not start with a full burst.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use kwcluster_core::{defaults, FetchOutcome, FetchResult, Result};

use crate::fetcher::SerpFetcher;

/// Batch sizing configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            batch_pause: Duration::from_millis(defaults::BATCH_PAUSE_MS),
        }
    }
}

impl SchedulerConfig {
    /// Create configuration from `SERP_BATCH_SIZE` and `SERP_BATCH_PAUSE_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("SERP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.batch_size = n.max(1);
        }
        if let Some(ms) = std::env::var("SERP_BATCH_PAUSE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.batch_pause = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }
}

/// Receives each batch's results as soon as the batch finishes.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// `offset` is the input position of `results[0]`.
    async fn on_batch(&self, batch_index: usize, offset: usize, results: &[FetchResult])
        -> Result<()>;
}

/// Drives a [`SerpFetcher`] over a keyword list in bounded batches.
#[derive(Clone)]
pub struct BatchScheduler {
    fetcher: SerpFetcher,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(fetcher: SerpFetcher, config: SchedulerConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetch every keyword; results are in input order.
    pub async fn run<K: AsRef<str> + Sync>(&self, keywords: &[K]) -> Vec<FetchResult> {
        let mut all = Vec::with_capacity(keywords.len());
        for (batch_index, batch) in self.batches(keywords) {
            all.extend(self.fetch_batch(batch_index, keywords.len(), batch).await);
        }
        all
    }

    /// Like [`run`](Self::run), handing each batch to `sink` before the next starts.
    ///
    /// A sink error stops the run and is returned.
    pub async fn run_with_sink<K: AsRef<str> + Sync>(
        &self,
        keywords: &[K],
        sink: &dyn BatchSink,
    ) -> Result<Vec<FetchResult>> {
        let mut all = Vec::with_capacity(keywords.len());
        for (batch_index, batch) in self.batches(keywords) {
            let offset = all.len();
            let results = self.fetch_batch(batch_index, keywords.len(), batch).await;
            sink.on_batch(batch_index, offset, &results).await?;
            all.extend(results);
        }
        Ok(all)
    }

    /// Batches paired with their index.
    fn batches<'a, K>(&self, keywords: &'a [K]) -> impl Iterator<Item = (usize, &'a [K])> {
        keywords.chunks(self.config.batch_size).enumerate()
    }

    /// Fetch one batch concurrently, pausing first unless it is the first batch.
    async fn fetch_batch<K: AsRef<str> + Sync>(
        &self,
        batch_index: usize,
        total: usize,
        batch: &[K],
    ) -> Vec<FetchResult> {
        if batch_index > 0 && !self.config.batch_pause.is_zero() {
            tokio::time::sleep(self.config.batch_pause).await;
        }

        let current_load = match self.fetcher.limiter().current_load().await {
            Ok(load) => Some(load),
            Err(e) => {
                warn!(
                    subsystem = "serp",
                    component = "scheduler",
                    error = %e,
                    "Could not read rate limiter load"
                );
                None
            }
        };
        let batch_count = total.div_ceil(self.config.batch_size);
        info!(
            subsystem = "serp",
            component = "scheduler",
            op = "batch",
            batch_index,
            batch_count,
            keyword_count = batch.len(),
            current_load,
            max_qps = self.fetcher.limiter().max_qps(),
            "Fetching batch"
        );

        let start = Instant::now();
        let results = join_all(batch.iter().map(|kw| self.fetcher.fetch(kw.as_ref()))).await;
        let fetched = results
            .iter()
            .filter(|r| r.outcome == FetchOutcome::Success)
            .count();
        info!(
            subsystem = "serp",
            component = "scheduler",
            op = "batch",
            batch_index,
            fetched,
            missed = results.len() - fetched,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch finished"
        );
        results
    }
}
