//! Job store: the persisted Job and File records.
//!
//! The store is the single source of truth for status. Every status write
//! is a per-row atomic update; job transitions are applied only when the
//! [`JobStatus`] state machine allows them.

use async_trait::async_trait;
use docconv_core::types::DbId;
use docconv_db::models::file::JobFile;
use docconv_db::models::job::Job;
use docconv_db::models::status::JobStatus;

use crate::error::PipelineError;

mod memory;
mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job in `PENDING`.
    async fn create_job(&self) -> Result<Job, PipelineError>;

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, PipelineError>;

    /// Jobs currently in `status`, oldest first.
    async fn list_jobs(&self, status: JobStatus) -> Result<Vec<Job>, PipelineError>;

    /// Apply `to` if the job's current status allows it. Returns `false`
    /// for an unknown job or a rejected move.
    async fn transition_job(&self, job_id: DbId, to: JobStatus) -> Result<bool, PipelineError>;

    /// Delete a job and its file records. Returns `false` if it did not exist.
    async fn delete_job(&self, job_id: DbId) -> Result<bool, PipelineError>;

    /// Register a `PENDING` file under a job. A filename already present in
    /// the job is a [`CoreError::Conflict`](docconv_core::error::CoreError::Conflict).
    async fn add_file(&self, job_id: DbId, filename: &str) -> Result<JobFile, PipelineError>;

    async fn find_file(&self, job_id: DbId, filename: &str)
        -> Result<Option<JobFile>, PipelineError>;

    /// All files of a job in registration order.
    async fn list_files(&self, job_id: DbId) -> Result<Vec<JobFile>, PipelineError>;

    async fn mark_file_completed(&self, job_id: DbId, filename: &str)
        -> Result<bool, PipelineError>;

    async fn mark_file_failed(
        &self,
        job_id: DbId,
        filename: &str,
        error: &str,
    ) -> Result<bool, PipelineError>;

    /// Whether the backing storage is reachable.
    async fn health_check(&self) -> Result<(), PipelineError>;
}
