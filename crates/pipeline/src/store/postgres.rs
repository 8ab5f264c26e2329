use async_trait::async_trait;
use docconv_core::error::CoreError;
use docconv_core::types::DbId;
use docconv_db::models::file::{CreateFile, JobFile};
use docconv_db::models::job::Job;
use docconv_db::models::status::JobStatus;
use docconv_db::repositories::{FileRepo, JobRepo};
use docconv_db::DbPool;

use super::JobStore;
use crate::error::PipelineError;

/// [`JobStore`] over the `jobs` and `files` tables.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self) -> Result<Job, PipelineError> {
        Ok(JobRepo::create(&self.pool).await?)
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, PipelineError> {
        Ok(JobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn list_jobs(&self, status: JobStatus) -> Result<Vec<Job>, PipelineError> {
        Ok(JobRepo::list_by_status(&self.pool, status).await?)
    }

    async fn transition_job(&self, job_id: DbId, to: JobStatus) -> Result<bool, PipelineError> {
        Ok(JobRepo::transition(&self.pool, job_id, to).await?)
    }

    async fn delete_job(&self, job_id: DbId) -> Result<bool, PipelineError> {
        Ok(JobRepo::delete(&self.pool, job_id).await?)
    }

    async fn add_file(&self, job_id: DbId, filename: &str) -> Result<JobFile, PipelineError> {
        let input = CreateFile {
            job_id,
            original_filename: filename.to_string(),
        };
        FileRepo::create(&self.pool, &input).await.map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                PipelineError::Core(CoreError::Conflict(format!(
                    "Duplicate filename in job: {filename}"
                )))
            }
            other => PipelineError::Database(other),
        })
    }

    async fn find_file(
        &self,
        job_id: DbId,
        filename: &str,
    ) -> Result<Option<JobFile>, PipelineError> {
        Ok(FileRepo::find(&self.pool, job_id, filename).await?)
    }

    async fn list_files(&self, job_id: DbId) -> Result<Vec<JobFile>, PipelineError> {
        Ok(FileRepo::list_by_job(&self.pool, job_id).await?)
    }

    async fn mark_file_completed(
        &self,
        job_id: DbId,
        filename: &str,
    ) -> Result<bool, PipelineError> {
        Ok(FileRepo::mark_completed(&self.pool, job_id, filename).await?)
    }

    async fn mark_file_failed(
        &self,
        job_id: DbId,
        filename: &str,
        error: &str,
    ) -> Result<bool, PipelineError> {
        Ok(FileRepo::mark_failed(&self.pool, job_id, filename, error).await?)
    }

    async fn health_check(&self) -> Result<(), PipelineError> {
        Ok(docconv_db::health_check(&self.pool).await?)
    }
}
