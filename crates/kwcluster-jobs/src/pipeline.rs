//! Keyword research pipeline: parse, fetch, classify, enrich, finish.
//!
//! A job is run at most once. The `pending -> running` transition is an
//! atomic conditional update, and a job that already owns keyword records is
//! failed as a duplicate before any work is done. Per-keyword fetch failures
//! are data on the record; only structural errors fail the job, and every
//! terminal transition is announced through the [`JobNotifier`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use kwcluster_core::{
    defaults, parse_keywords, Error, FetchResult, IntentClassifier, IntentLabels, Job, JobEvent,
    JobNotifier, JobRepository, KeywordRecord, KeywordRepository, Result,
};
use kwcluster_serp::{BatchScheduler, BatchSink};

use crate::classifier::SimilarityClassifier;

/// Error message recorded when a job is started a second time.
pub const DUPLICATE_TASK_MESSAGE: &str = "Duplicate task detected";

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause between intent classifier calls.
    pub ai_request_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ai_request_interval: Duration::from_millis(defaults::AI_REQUEST_INTERVAL_MS),
        }
    }
}

impl PipelineConfig {
    /// Read `AI_REQUEST_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = std::env::var("AI_REQUEST_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.ai_request_interval = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_ai_request_interval(mut self, interval: Duration) -> Self {
        self.ai_request_interval = interval;
        self
    }
}

/// What one successful run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub keyword_count: usize,
    pub fetched: usize,
    pub primary_count: usize,
    pub auxiliary_count: usize,
    pub labelled: usize,
    pub fetch_ms: u64,
    pub classify_ms: u64,
    pub enrich_ms: u64,
}

/// Sequences one job through every phase and records its terminal state.
pub struct PipelineOrchestrator {
    jobs: Arc<dyn JobRepository>,
    keywords: Arc<dyn KeywordRepository>,
    scheduler: BatchScheduler,
    similarity: SimilarityClassifier,
    intent: Option<Arc<dyn IntentClassifier>>,
    notifier: Arc<dyn JobNotifier>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        keywords: Arc<dyn KeywordRepository>,
        scheduler: BatchScheduler,
        notifier: Arc<dyn JobNotifier>,
    ) -> Self {
        Self {
            jobs,
            keywords,
            scheduler,
            similarity: SimilarityClassifier::default(),
            intent: None,
            notifier,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_intent_classifier(mut self, classifier: Option<Arc<dyn IntentClassifier>>) -> Self {
        self.intent = classifier;
        self
    }

    pub fn with_similarity(mut self, similarity: SimilarityClassifier) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn jobs(&self) -> &Arc<dyn JobRepository> {
        &self.jobs
    }

    /// Move a pending job to `running` and run it to a terminal state.
    ///
    /// Returns [`Error::Job`] without touching the job when it is not pending,
    /// i.e. another worker owns it or it already finished.
    pub async fn start(&self, job_id: Uuid) -> Result<PipelineReport> {
        if !self.jobs.try_start(job_id).await? {
            return Err(Error::Job(format!("Job {} is not pending", job_id)));
        }
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;
        self.run_claimed(job).await
    }

    /// Run a job that is already `running` and record the outcome.
    ///
    /// On error the job is marked failed with the error message before the
    /// error is returned.
    #[instrument(skip(self, job), fields(subsystem = "jobs", component = "pipeline", job_id = %job.id))]
    pub async fn run_claimed(&self, job: Job) -> Result<PipelineReport> {
        let start = Instant::now();
        info!(owner = %job.owner, name = %job.name, "Pipeline started");

        match self.execute(&job).await {
            Ok(report) => {
                if !self.jobs.complete(job.id).await? {
                    warn!("Job left running state before completion");
                    return Err(Error::Job(format!("Job {} is no longer running", job.id)));
                }
                let done = self.jobs.get(job.id).await?.unwrap_or(job);
                info!(
                    keyword_count = report.keyword_count,
                    fetched = report.fetched,
                    primary_count = report.primary_count,
                    auxiliary_count = report.auxiliary_count,
                    labelled = report.labelled,
                    fetch_ms = report.fetch_ms,
                    classify_ms = report.classify_ms,
                    enrich_ms = report.enrich_ms,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Pipeline completed"
                );
                self.notifier.notify(JobEvent::completed(&done));
                Ok(report)
            }
            Err(e) => {
                error!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Pipeline failed"
                );
                self.fail(&job, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Fail a job that will never finish, dropping its partial records.
    pub async fn abandon(&self, job: &Job, reason: &str) -> Result<bool> {
        let failed = self.jobs.fail(job.id, reason).await?;
        if failed {
            let removed = self.keywords.delete_for_job(job.id).await?;
            warn!(
                subsystem = "jobs",
                component = "pipeline",
                job_id = %job.id,
                removed,
                reason,
                "Job abandoned"
            );
            self.notifier.notify(JobEvent::failed(job, reason));
        }
        Ok(failed)
    }

    async fn fail(&self, job: &Job, message: &str) {
        match self.jobs.fail(job.id, message).await {
            Ok(true) => self.notifier.notify(JobEvent::failed(job, message)),
            Ok(false) => debug!("Job already terminal; failure not recorded"),
            Err(e) => error!(error = %e, "Failed to mark job as failed"),
        }
    }

    async fn execute(&self, job: &Job) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        let raw = tokio::fs::read(&job.input_path).await?;
        let inputs = parse_keywords(raw.as_slice())?;
        report.keyword_count = inputs.len();

        if self.keywords.count_for_job(job.id).await? > 0 {
            return Err(Error::Job(DUPLICATE_TASK_MESSAGE.to_string()));
        }

        let records = inputs
            .into_iter()
            .enumerate()
            .map(|(idx, input)| {
                let seq = i32::try_from(idx)
                    .map_err(|_| Error::InvalidInput("Too many keyword rows".to_string()))?;
                Ok(KeywordRecord::new(job.id, seq, input))
            })
            .collect::<Result<Vec<_>>>()?;
        self.keywords.insert_batch(&records).await?;

        let phase = Instant::now();
        let keywords: Vec<&str> = records.iter().map(|r| r.keyword.as_str()).collect();
        let record_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let sink = RecordSink {
            keywords: self.keywords.as_ref(),
            record_ids: &record_ids,
        };
        let results = self.scheduler.run_with_sink(&keywords, &sink).await?;
        report.fetched = results.iter().filter(|r| r.outcome.is_success()).count();
        report.fetch_ms = phase.elapsed().as_millis() as u64;

        let phase = Instant::now();
        let mut records = self.keywords.list_for_job(job.id).await?;
        let summary = self.similarity.classify(&mut records);
        self.keywords.save_classification(&records).await?;
        report.primary_count = summary.primary_count;
        report.auxiliary_count = summary.auxiliary_count;
        report.classify_ms = phase.elapsed().as_millis() as u64;

        if job.ai_analysis_enabled {
            let phase = Instant::now();
            report.labelled = self.enrich(job).await?;
            report.enrich_ms = phase.elapsed().as_millis() as u64;
        }

        Ok(report)
    }

    /// Label every primary record. Classifier failures store `N/A`.
    async fn enrich(&self, job: &Job) -> Result<usize> {
        let Some(intent) = &self.intent else {
            warn!("AI analysis requested but no intent classifier is configured");
            return Ok(0);
        };

        let primaries = self.keywords.list_primary_for_job(job.id).await?;
        info!(
            primary_count = primaries.len(),
            model = intent.model_name(),
            "Labelling primary keywords"
        );

        let mut called = false;
        let mut labelled = 0;
        for record in &primaries {
            let labels = if record.result_links.is_empty() {
                IntentLabels::not_applicable()
            } else {
                if called && !self.config.ai_request_interval.is_zero() {
                    tokio::time::sleep(self.config.ai_request_interval).await;
                }
                called = true;
                match intent.classify(&record.keyword, &record.result_links).await {
                    Ok(labels) => labels,
                    Err(e) => {
                        warn!(keyword = %record.keyword, error = %e, "Intent classification failed");
                        IntentLabels::not_applicable()
                    }
                }
            };
            if !labels.is_not_applicable() {
                labelled += 1;
            }
            self.keywords.set_intent(record.id, &labels).await?;
        }
        Ok(labelled)
    }
}

/// Writes each finished batch back to its records.
struct RecordSink<'a> {
    keywords: &'a dyn KeywordRepository,
    record_ids: &'a [Uuid],
}

#[async_trait]
impl BatchSink for RecordSink<'_> {
    async fn on_batch(
        &self,
        batch_index: usize,
        offset: usize,
        results: &[FetchResult],
    ) -> Result<()> {
        let ids = self
            .record_ids
            .get(offset..offset + results.len())
            .ok_or_else(|| Error::Internal(format!("Batch {} out of range", batch_index)))?;
        let updates: Vec<(Uuid, FetchResult)> =
            ids.iter().copied().zip(results.iter().cloned()).collect();
        self.keywords.record_fetch_results(&updates).await?;
        debug!(
            batch_index,
            written = updates.len(),
            progress = offset + results.len(),
            total = self.record_ids.len(),
            "Batch persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use kwcluster_core::{Classification, FetchOutcome, JobStatus};
    use kwcluster_inference::mock::MockIntentClassifier;

    #[tokio::test]
    async fn test_run_classifies_and_completes() {
        let harness = Harness::new(
            FixtureProvider::default()
                .with_links("buy shoes", 0..10)
                .with_links("cheap shoes", 0..10)
                .with_links("shoe repair", 100..110),
        );
        let job = harness
            .submit(
                "keyword,volume\ncheap shoes,300\nbuy shoes,500\nshoe repair,40\n",
                false,
            )
            .await;

        let report = harness.pipeline().start(job.id).await.unwrap();
        assert_eq!(report.keyword_count, 3);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.primary_count, 2);
        assert_eq!(report.auxiliary_count, 1);

        let stored = harness.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);

        let primaries = harness.store.list_primary_for_job(job.id).await.unwrap();
        assert_eq!(primaries[0].keyword, "buy shoes");
        assert_eq!(primaries[0].search_volume, 800);
        assert_eq!(primaries[1].keyword, "shoe repair");

        let events = harness.events.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unfetched_keyword_survives_as_primary() {
        let harness = Harness::new(
            FixtureProvider::default()
                .with_links("ok", 0..10)
                .with_links("short", 0..4),
        );
        let job = harness
            .submit("keyword,volume\nok,10\nshort,10\nmissing,5\n", false)
            .await;
        harness.pipeline().start(job.id).await.unwrap();

        let records = harness.store.list_for_job(job.id).await.unwrap();
        assert!(records.iter().all(|r| r.classification == Classification::Primary));
        assert_eq!(records[1].fetch_outcome, Some(FetchOutcome::Insufficient));
        assert!(records[1].result_links.is_empty());
        assert!(records[2].merged_keywords.is_empty());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_without_side_effects() {
        let harness = Harness::new(FixtureProvider::default().with_links("a", 0..10));
        let job = harness.submit("keyword,volume\na,1\n", false).await;
        let pipeline = harness.pipeline();
        pipeline.start(job.id).await.unwrap();

        let err = pipeline.start(job.id).await.unwrap_err();
        assert!(matches!(err, Error::Job(_)));
        let stored = harness.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(harness.events.take().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_records_fail_as_duplicate() {
        let harness = Harness::new(FixtureProvider::default().with_links("a", 0..10));
        let job = harness.submit("keyword,volume\na,1\n", false).await;
        harness
            .store
            .insert_batch(&[KeywordRecord::new(
                job.id,
                0,
                kwcluster_core::KeywordInput {
                    keyword: "a".into(),
                    search_volume: 1,
                    word_count: None,
                },
            )])
            .await
            .unwrap();

        let err = harness.pipeline().start(job.id).await.unwrap_err();
        assert!(err.to_string().contains(DUPLICATE_TASK_MESSAGE));

        let stored = harness.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored
            .error_message
            .unwrap()
            .contains(DUPLICATE_TASK_MESSAGE));
        // the pre-existing record is untouched
        let records = harness.store.list_for_job(job.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fetch_outcome, None);

        let events = harness.events.take();
        assert_eq!(events[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_input_fails_job() {
        let harness = Harness::new(FixtureProvider::default());
        let job = harness.submit("keyword,volume\n", false).await;

        let err = harness.pipeline().start(job.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let stored = harness.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_enrichment_labels_primaries_and_tolerates_failures() {
        let harness = Harness::new(
            FixtureProvider::default()
                .with_links("buy shoes", 0..10)
                .with_links("broken", 20..30),
        );
        let job = harness
            .submit("keyword,volume\nbuy shoes,10\nbroken,5\nno links,1\n", true)
            .await;
        let classifier = MockIntentClassifier::new()
            .with_labels("buy shoes", IntentLabels::new("Transactional", "product"))
            .with_failure("broken");

        let report = harness
            .pipeline()
            .with_intent_classifier(Some(Arc::new(classifier.clone())))
            .start(job.id)
            .await
            .unwrap();
        assert_eq!(report.labelled, 1);

        let primaries = harness.store.list_primary_for_job(job.id).await.unwrap();
        assert_eq!(primaries[0].search_intent.as_deref(), Some("Transactional"));
        assert_eq!(primaries[0].intent_type.as_deref(), Some("product"));
        assert_eq!(primaries[1].search_intent.as_deref(), Some("N/A"));
        assert_eq!(primaries[2].intent_type.as_deref(), Some("N/A"));

        // no call is made for a keyword without links
        let called: Vec<String> = classifier.calls().into_iter().map(|c| c.keyword).collect();
        assert_eq!(called, vec!["buy shoes", "broken"]);

        let stored = harness.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_enrichment_skipped_when_not_requested() {
        let harness = Harness::new(FixtureProvider::default().with_links("a", 0..10));
        let job = harness.submit("keyword,volume\na,1\n", false).await;
        let classifier = MockIntentClassifier::new();

        harness
            .pipeline()
            .with_intent_classifier(Some(Arc::new(classifier.clone())))
            .start(job.id)
            .await
            .unwrap();
        assert_eq!(classifier.call_count(), 0);
        let records = harness.store.list_for_job(job.id).await.unwrap();
        assert!(records[0].search_intent.is_none());
    }

    #[tokio::test]
    async fn test_abandon_fails_and_clears_records() {
        let harness = Harness::new(FixtureProvider::default().with_links("a", 0..10));
        let job = harness.submit("keyword,volume\na,1\n", false).await;
        let pipeline = harness.pipeline();
        harness.store.try_start(job.id).await.unwrap();
        harness
            .store
            .insert_batch(&[KeywordRecord::new(
                job.id,
                0,
                kwcluster_core::KeywordInput {
                    keyword: "a".into(),
                    search_volume: 1,
                    word_count: None,
                },
            )])
            .await
            .unwrap();

        assert!(pipeline.abandon(&job, "abandoned").await.unwrap());
        assert_eq!(harness.store.count_for_job(job.id).await.unwrap(), 0);
        let stored = harness.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some("abandoned"));

        // a second abandon is a no-op
        assert!(!pipeline.abandon(&job, "abandoned").await.unwrap());
        assert_eq!(harness.events.take().len(), 1);
    }
}
