//! Job submission, status, and export.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use kwcluster_core::{
    export_csv, parse_keywords, CreateJobRequest, Job, JobStatus, JobStatusSummary,
};

use super::Owner;
use crate::error::ApiError;
use crate::state::AppState;

/// Submit a keyword file for research.
///
/// # Multipart Fields
/// - `file`: CSV with a header row, then `keyword, search_volume[, word_count]` (required)
/// - `description`: free text; its first words become the job name (optional)
/// - `ai_analysis`: `true`/`on`/`1` to label primary keywords with intent (optional)
///
/// The file is validated before the job is created; an unusable file is a 400.
pub async fn submit_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut description: Option<String> = None;
    let mut ai_analysis = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("keywords.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("description") => {
                description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?,
                );
            }
            Some("ai_analysis") => {
                let val = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                ai_analysis = matches!(val.trim(), "true" | "on" | "1");
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing file in multipart form".to_string()))?;
    let keyword_count = parse_keywords(bytes.as_slice())?.len();

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(kwcluster_core::Error::from)?;
    let input_path = state.upload_dir.join(format!("{}.csv", Uuid::now_v7()));
    tokio::fs::write(&input_path, &bytes)
        .await
        .map_err(kwcluster_core::Error::from)?;

    let job = state
        .jobs
        .create(CreateJobRequest::new(
            owner,
            &file_name,
            description,
            input_path.to_string_lossy(),
            ai_analysis,
        ))
        .await?;

    info!(
        subsystem = "api",
        job_id = %job.id,
        owner = %job.owner,
        keyword_count,
        ai_analysis,
        "Job submitted"
    );
    Ok((StatusCode::CREATED, Json(job)))
}

/// Running jobs plus the most recent finished ones for the caller.
pub async fn list_jobs(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<JobStatusSummary>, ApiError> {
    let running = state.jobs.list_running_for_owner(&owner).await?;
    let recent = state
        .jobs
        .list_recent_terminal_for_owner(&owner, state.recent_jobs_limit)
        .await?;
    Ok(Json(JobStatusSummary { running, recent }))
}

pub async fn get_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(owned_job(&state, &owner, id).await?))
}

/// CSV of the job's primary keywords. Only completed jobs export.
pub async fn export_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = owned_job(&state, &owner, id).await?;
    if job.status != JobStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "Job is {}; only completed jobs can be exported",
            job.status
        )));
    }

    let primaries = state.keywords.list_primary_for_job(job.id).await?;
    let body = export_csv(&primaries)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"keywords-{}.csv\"", job.id),
            ),
        ],
        body,
    ))
}

/// Jobs belonging to someone else are reported as missing.
async fn owned_job(state: &AppState, owner: &str, id: Uuid) -> Result<Job, ApiError> {
    match state.jobs.get(id).await? {
        Some(job) if job.owner == owner => Ok(job),
        _ => Err(ApiError::NotFound(format!("Job {} not found", id))),
    }
}
