//! Handlers for the `/jobs` resource.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use docconv_core::error::CoreError;
use docconv_core::types::{DbId, Timestamp};
use docconv_db::models::file::JobFile;
use docconv_db::models::job::Job;
use docconv_db::models::status::{FileStatus, JobStatus};
use docconv_pipeline::blob::BlobKey;
use docconv_pipeline::dispatcher::UploadedFile;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: DbId,
    pub accepted_file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FileStatusResponse {
    pub filename: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: DbId,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub files: Vec<FileStatusResponse>,
    /// Present only once the job is `COMPLETED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl From<JobFile> for FileStatusResponse {
    fn from(file: JobFile) -> Self {
        Self {
            filename: file.original_filename,
            status: file.status,
            error_message: file.error_message,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_job(state: &AppState, job_id: DbId) -> AppResult<Job> {
    state
        .backends
        .store
        .find_job(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Accepts one or more files as multipart fields (any field name). Returns
/// 202 once every accepted file has been queued for conversion.
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        // Plain form fields carry no file name and are not uploads.
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        uploads.push(UploadedFile::new(filename, data.to_vec()));
    }

    let submission = state.dispatcher.submit(uploads).await?;

    tracing::info!(
        job_id = %submission.job_id,
        accepted = submission.accepted_file_count,
        "Job submitted",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: submission.job_id,
            accepted_file_count: submission.accepted_file_count,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<JobStatusResponse>> {
    let job = find_job(&state, job_id).await?;
    let files = state.backends.store.list_files(job_id).await?;

    let download_url = (job.status == JobStatus::Completed)
        .then(|| state.config.download_url(job_id));

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        created_at: job.created_at,
        files: files.into_iter().map(FileStatusResponse::from).collect(),
        download_url,
    }))
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/download
///
/// Streams the job's ZIP archive. 400 until the job is `COMPLETED`.
pub async fn download_archive(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, job_id).await?;

    if job.status != JobStatus::Completed {
        return Err(AppError::BadRequest(format!(
            "Job is not yet complete. Current status: {}",
            job.status
        )));
    }

    let archive = state
        .backends
        .blobs
        .get(BlobKey::archive(job_id))
        .await?
        .ok_or_else(|| {
            tracing::error!(job_id = %job_id, "Completed job has no archive");
            AppError::Core(CoreError::NotFound {
                entity: "Archive",
                id: job_id,
            })
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=conversion_{job_id}.zip"),
            ),
        ],
        archive,
    ))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Removes a finished job with its files and archive. 409 while the job is
/// still running.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<StatusCode> {
    let job = find_job(&state, job_id).await?;

    if !job.status.is_terminal() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job is still running. Current status: {}",
            job.status
        ))));
    }

    if !state.backends.discard_job(job_id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }));
    }

    Ok(StatusCode::NO_CONTENT)
}
