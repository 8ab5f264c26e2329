use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use docconv_core::error::CoreError;
use docconv_core::types::{new_id, DbId};
use docconv_db::models::file::JobFile;
use docconv_db::models::job::Job;
use docconv_db::models::status::{FileStatus, JobStatus};
use tokio::sync::RwLock;

use super::JobStore;
use crate::error::PipelineError;

struct JobEntry {
    job: Job,
    files: Vec<JobFile>,
}

/// In-process [`JobStore`]. State lives for the lifetime of the value.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<DbId, JobEntry>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_file(
        &self,
        job_id: DbId,
        filename: &str,
        status: FileStatus,
        error: Option<&str>,
    ) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(file) = jobs
            .get_mut(&job_id)
            .and_then(|entry| entry.files.iter_mut().find(|f| f.original_filename == filename))
        else {
            return false;
        };
        file.status = status;
        file.error_message = error.map(str::to_string);
        file.updated_at = Utc::now();
        true
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self) -> Result<Job, PipelineError> {
        let now = Utc::now();
        let job = Job {
            id: new_id(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().await.insert(
            job.id,
            JobEntry {
                job: job.clone(),
                files: Vec::new(),
            },
        );
        Ok(job)
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, PipelineError> {
        Ok(self.jobs.read().await.get(&job_id).map(|e| e.job.clone()))
    }

    async fn list_jobs(&self, status: JobStatus) -> Result<Vec<Job>, PipelineError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|e| e.job.status == status)
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        Ok(jobs)
    }

    async fn transition_job(&self, job_id: DbId, to: JobStatus) -> Result<bool, PipelineError> {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if !entry.job.status.can_transition_to(to) {
            return Ok(false);
        }
        entry.job.status = to;
        entry.job.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_job(&self, job_id: DbId) -> Result<bool, PipelineError> {
        Ok(self.jobs.write().await.remove(&job_id).is_some())
    }

    async fn add_file(&self, job_id: DbId, filename: &str) -> Result<JobFile, PipelineError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        })?;
        if entry.files.iter().any(|f| f.original_filename == filename) {
            return Err(CoreError::Conflict(format!("Duplicate filename in job: {filename}")).into());
        }

        let now = Utc::now();
        let file = JobFile {
            id: new_id(),
            job_id,
            original_filename: filename.to_string(),
            status: FileStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        entry.files.push(file.clone());
        Ok(file)
    }

    async fn find_file(
        &self,
        job_id: DbId,
        filename: &str,
    ) -> Result<Option<JobFile>, PipelineError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&job_id).and_then(|entry| {
            entry
                .files
                .iter()
                .find(|f| f.original_filename == filename)
                .cloned()
        }))
    }

    async fn list_files(&self, job_id: DbId) -> Result<Vec<JobFile>, PipelineError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&job_id).map(|e| e.files.clone()).unwrap_or_default())
    }

    async fn mark_file_completed(
        &self,
        job_id: DbId,
        filename: &str,
    ) -> Result<bool, PipelineError> {
        Ok(self
            .update_file(job_id, filename, FileStatus::Completed, None)
            .await)
    }

    async fn mark_file_failed(
        &self,
        job_id: DbId,
        filename: &str,
        error: &str,
    ) -> Result<bool, PipelineError> {
        Ok(self
            .update_file(job_id, filename, FileStatus::Failed, Some(error))
            .await)
    }

    async fn health_check(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
