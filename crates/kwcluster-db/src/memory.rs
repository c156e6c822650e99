//! In-process store implementing the job and keyword repositories.
//!
//! Used by the local runner and by pipeline tests. Transitions follow the same
//! conditional rules as the PostgreSQL repositories.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use kwcluster_core::{
    Classification, CreateJobRequest, FetchResult, IntentLabels, Job, JobRepository, JobStatus,
    KeywordRecord, KeywordRepository, Result,
};

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    records: HashMap<Uuid, KeywordRecord>,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_sequence(mut records: Vec<KeywordRecord>) -> Vec<KeywordRecord> {
    records.sort_by_key(|r| r.sequence_index);
    records
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn create(&self, req: CreateJobRequest) -> Result<Job> {
        let job = Job {
            id: Uuid::now_v7(),
            owner: req.owner,
            name: req.name,
            description: req.description,
            status: JobStatus::Pending,
            input_path: req.input_path,
            ai_analysis_enabled: req.ai_analysis_enabled,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.state.write().await.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state.read().await.jobs.get(&job_id).cloned())
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut state = self.state.write().await;
        let next = state
            .jobs
            .values_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| (j.created_at, j.id));
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn try_start(&self, job_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                job.error_message = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(&job_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error_message = Some(error.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_running_for_owner(&self, owner: &str) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.owner == owner && j.status == JobStatus::Running)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn list_recent_terminal_for_owner(&self, owner: &str, limit: i64) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.owner == owner && j.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn list_stale_running(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Running
                    && j.started_at.is_some_and(|started| started < started_before)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.started_at);
        Ok(jobs)
    }
}

#[async_trait]
impl KeywordRepository for MemoryStore {
    async fn count_for_job(&self, job_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state.records.values().filter(|r| r.job_id == job_id).count() as i64)
    }

    async fn insert_batch(&self, records: &[KeywordRecord]) -> Result<()> {
        let mut state = self.state.write().await;
        for record in records {
            state.records.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn record_fetch_results(&self, results: &[(Uuid, FetchResult)]) -> Result<()> {
        let mut state = self.state.write().await;
        for (record_id, result) in results {
            if let Some(record) = state.records.get_mut(record_id) {
                record.apply_fetch(result.clone());
            }
        }
        Ok(())
    }

    async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<KeywordRecord>> {
        let state = self.state.read().await;
        Ok(sorted_by_sequence(
            state
                .records
                .values()
                .filter(|r| r.job_id == job_id)
                .cloned()
                .collect(),
        ))
    }

    async fn save_classification(&self, records: &[KeywordRecord]) -> Result<()> {
        let mut state = self.state.write().await;
        for record in records {
            if let Some(stored) = state.records.get_mut(&record.id) {
                stored.classification = record.classification;
                stored.search_volume = record.search_volume;
                stored.merged_keywords = record.merged_keywords.clone();
            }
        }
        Ok(())
    }

    async fn set_intent(&self, record_id: Uuid, labels: &IntentLabels) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(record) = state.records.get_mut(&record_id) {
            record.search_intent = Some(labels.intent.clone());
            record.intent_type = Some(labels.kind.clone());
        }
        Ok(())
    }

    async fn list_primary_for_job(&self, job_id: Uuid) -> Result<Vec<KeywordRecord>> {
        let state = self.state.read().await;
        Ok(sorted_by_sequence(
            state
                .records
                .values()
                .filter(|r| r.job_id == job_id && r.classification == Classification::Primary)
                .cloned()
                .collect(),
        ))
    }

    async fn delete_for_job(&self, job_id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|_, r| r.job_id != job_id);
        Ok((before - state.records.len()) as u64)
    }
}
