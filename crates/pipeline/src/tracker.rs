//! Job-level status transitions.
//!
//! Every job status write in the engine goes through [`StatusTracker`].
//! A move the state machine does not allow is a logged no-op reported to
//! the caller as `false`.

use std::sync::Arc;

use docconv_core::types::DbId;
use docconv_db::models::status::JobStatus;

use crate::error::PipelineError;
use crate::store::JobStore;

#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn JobStore>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn transition(&self, job_id: DbId, to: JobStatus) -> Result<bool, PipelineError> {
        let applied = self.store.transition_job(job_id, to).await?;
        if applied {
            tracing::info!(job_id = %job_id, status = %to, "Job status changed");
        } else {
            let current = self.store.find_job(job_id).await?.map(|job| job.status);
            tracing::warn!(
                job_id = %job_id,
                to = %to,
                current = ?current,
                "Rejected job status transition",
            );
        }
        Ok(applied)
    }

    /// `PENDING -> IN_PROGRESS`, once the units are dispatched.
    pub async fn mark_in_progress(&self, job_id: DbId) -> Result<bool, PipelineError> {
        self.transition(job_id, JobStatus::InProgress).await
    }

    /// `IN_PROGRESS -> COMPLETED`, once an archive with at least one entry
    /// is stored.
    pub async fn mark_completed(&self, job_id: DbId) -> Result<bool, PipelineError> {
        self.transition(job_id, JobStatus::Completed).await
    }

    /// `PENDING | IN_PROGRESS -> FAILED`.
    pub async fn mark_failed(&self, job_id: DbId, reason: &str) -> Result<bool, PipelineError> {
        tracing::warn!(job_id = %job_id, reason, "Failing job");
        self.transition(job_id, JobStatus::Failed).await
    }
}
