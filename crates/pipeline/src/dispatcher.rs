//! Job submission and fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use docconv_core::error::CoreError;
use docconv_core::naming::{base_name, is_accepted};
use docconv_core::types::DbId;

use crate::archive::ArchiveBuilder;
use crate::barrier::FanInBarrier;
use crate::blob::{BlobKey, BlobStore};
use crate::error::PipelineError;
use crate::outcome::{FailureKind, UnitOutcome};
use crate::queue::{ConversionUnit, WorkQueue};
use crate::store::JobStore;
use crate::tracker::StatusTracker;
use crate::worker::report_outcome;

/// One named payload from a submission.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub job_id: DbId,
    pub accepted_file_count: usize,
}

/// Creates jobs and fans their files out to the work queue.
///
/// Never waits for conversions: [`Dispatcher::submit`] returns as soon as
/// every unit is enqueued.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    barrier: Arc<dyn FanInBarrier>,
    queue: Arc<dyn WorkQueue>,
    tracker: StatusTracker,
    archiver: ArchiveBuilder,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        barrier: Arc<dyn FanInBarrier>,
        queue: Arc<dyn WorkQueue>,
        tracker: StatusTracker,
        archiver: ArchiveBuilder,
    ) -> Self {
        Self {
            store,
            blobs,
            barrier,
            queue,
            tracker,
            archiver,
        }
    }

    /// Accept a batch of uploads.
    ///
    /// Names are reduced to their base name and filtered to `.docx`. An
    /// empty batch is rejected before any job exists; a batch where nothing
    /// passes the filter leaves a `FAILED` job behind.
    pub async fn submit(&self, files: Vec<UploadedFile>) -> Result<Submission, PipelineError> {
        if files.is_empty() {
            return Err(CoreError::Validation("No files were provided.".into()).into());
        }

        let accepted = accept(files)?;

        let job = self.store.create_job().await?;
        let job_id = job.id;

        if accepted.is_empty() {
            self.tracker
                .mark_failed(job_id, "no accepted files in submission")
                .await?;
            return Err(CoreError::Validation("No valid .docx files were uploaded.".into()).into());
        }

        let mut registered = Vec::with_capacity(accepted.len());
        if let Err(e) = self.register_files(job_id, &accepted, &mut registered).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to register submitted files");
            self.abandon(job_id, &registered, "files could not be stored").await;
            return Err(e);
        }

        let count = accepted.len();
        if let Err(e) = self.barrier.arm(job_id, count).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to arm barrier");
            self.abandon(job_id, &registered, "barrier could not be armed").await;
            return Err(e);
        }
        match self.tracker.mark_in_progress(job_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.abandon(job_id, &registered, "job could not be started").await;
                return Err(CoreError::Conflict(format!("Job {job_id} could not be started")).into());
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to start job");
                self.abandon(job_id, &registered, "job could not be started").await;
                return Err(e);
            }
        }

        for file in &accepted {
            self.enqueue(job_id, &file.filename).await;
        }

        tracing::info!(job_id = %job_id, files = count, "Job dispatched");
        Ok(Submission {
            job_id,
            accepted_file_count: count,
        })
    }

    /// Register each file and store its bytes. `registered` collects every
    /// file record created, including one whose bytes failed to store.
    async fn register_files(
        &self,
        job_id: DbId,
        files: &[UploadedFile],
        registered: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        for file in files {
            self.store.add_file(job_id, &file.filename).await?;
            registered.push(file.filename.clone());
            self.blobs
                .put(BlobKey::original(job_id, &file.filename), &file.data)
                .await?;
        }
        Ok(())
    }

    /// Settle a job whose dispatch broke off: its registered files and then
    /// the job itself go to `FAILED`. Best effort; errors are logged.
    async fn abandon(&self, job_id: DbId, registered: &[String], reason: &str) {
        let detail = format!("Submission could not be dispatched: {reason}");
        for filename in registered {
            if let Err(e) = self.store.mark_file_failed(job_id, filename, &detail).await {
                tracing::error!(job_id = %job_id, filename, error = %e, "Failed to record file failure");
            }
        }
        if let Err(e) = self.barrier.forget(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to drop barrier");
        }
        if let Err(e) = self.tracker.mark_failed(job_id, reason).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job failed");
        }
    }

    /// Enqueue one unit. A unit that cannot be enqueued is failed in place
    /// and reported, so the barrier still sees all of its units.
    async fn enqueue(&self, job_id: DbId, filename: &str) {
        let Err(e) = self
            .queue
            .enqueue(ConversionUnit::new(job_id, filename))
            .await
        else {
            return;
        };

        let detail = format!("Could not enqueue conversion: {e}");
        tracing::error!(job_id = %job_id, filename, error = %e, "Failed to enqueue conversion unit");
        if let Err(e) = self.store.mark_file_failed(job_id, filename, &detail).await {
            tracing::error!(job_id = %job_id, filename, error = %e, "Failed to record file failure");
        }
        let outcome = UnitOutcome::failure(filename, FailureKind::Dispatch, detail);
        if let Err(e) = report_outcome(self.barrier.as_ref(), &self.archiver, job_id, outcome).await {
            tracing::error!(job_id = %job_id, filename, error = %e, "Failed to report dispatch failure");
        }
    }
}

/// Apply base-name reduction and the extension filter. Two accepted uploads
/// with the same base name are rejected.
fn accept(files: Vec<UploadedFile>) -> Result<Vec<UploadedFile>, PipelineError> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(files.len());

    for file in files {
        let Some(name) = base_name(&file.filename).filter(|n| is_accepted(n)) else {
            tracing::debug!(filename = %file.filename, "Ignoring upload with unsupported type");
            continue;
        };
        let name = name.to_string();
        if !seen.insert(name.clone()) {
            return Err(CoreError::Validation(format!("Duplicate filename in submission: {name}")).into());
        }
        accepted.push(UploadedFile {
            filename: name,
            data: file.data,
        });
    }

    Ok(accepted)
}
