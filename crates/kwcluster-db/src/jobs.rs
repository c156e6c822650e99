//! Research job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use kwcluster_core::{CreateJobRequest, Error, Job, JobRepository, JobStatus, Result};

const JOB_COLUMNS: &str = "id, owner, name, description, status::text AS status, input_path, \
     ai_analysis_enabled, error_message, created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        s.parse().unwrap_or(JobStatus::Pending)
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        Job {
            id: row.get("id"),
            owner: row.get("owner"),
            name: row.get("name"),
            description: row.get("description"),
            status: Self::str_to_job_status(row.get("status")),
            input_path: row.get("input_path"),
            ai_analysis_enabled: row.get("ai_analysis_enabled"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, req: CreateJobRequest) -> Result<Job> {
        let id = Uuid::now_v7();
        let row = sqlx::query(&format!(
            "INSERT INTO research_job (id, owner, name, description, input_path, ai_analysis_enabled)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.owner)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.input_path)
        .bind(req.ai_analysis_enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(subsystem = "db", component = "jobs", op = "create", job_id = %id, "Job created");
        Ok(Self::parse_job_row(row))
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM research_job WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        // FOR UPDATE SKIP LOCKED lets several workers poll the same table.
        let row = sqlx::query(&format!(
            "UPDATE research_job
             SET status = 'running'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM research_job
                 WHERE status = 'pending'::job_status
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn try_start(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE research_job
             SET status = 'running'::job_status, started_at = $1
             WHERE id = $2 AND status = 'pending'::job_status",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE research_job
             SET status = 'completed'::job_status, completed_at = $1, error_message = NULL
             WHERE id = $2 AND status = 'running'::job_status",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE research_job
             SET status = 'failed'::job_status, completed_at = $1, error_message = $2
             WHERE id = $3 AND status IN ('pending'::job_status, 'running'::job_status)",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_running_for_owner(&self, owner: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM research_job
             WHERE owner = $1 AND status = 'running'::job_status
             ORDER BY created_at ASC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn list_recent_terminal_for_owner(&self, owner: &str, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM research_job
             WHERE owner = $1 AND status IN ('completed'::job_status, 'failed'::job_status)
             ORDER BY completed_at DESC NULLS LAST, created_at DESC
             LIMIT $2"
        ))
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn list_stale_running(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM research_job
             WHERE status = 'running'::job_status AND started_at < $1
             ORDER BY started_at ASC"
        ))
        .bind(started_before)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_to_job_status() {
        assert_eq!(PgJobRepository::str_to_job_status("running"), JobStatus::Running);
        assert_eq!(PgJobRepository::str_to_job_status("failed"), JobStatus::Failed);
        assert_eq!(PgJobRepository::str_to_job_status("bogus"), JobStatus::Pending);
    }

    #[test]
    fn test_job_columns_cast_status_to_text() {
        assert!(JOB_COLUMNS.contains("status::text AS status"));
    }
}
