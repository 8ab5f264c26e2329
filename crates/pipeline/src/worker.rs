//! Conversion worker: one unit in, one barrier report out.

use std::sync::Arc;
use std::time::Duration;

use docconv_core::types::DbId;

use crate::archive::ArchiveBuilder;
use crate::barrier::{FanInBarrier, Release};
use crate::blob::{BlobKey, BlobStore};
use crate::converter::Converter;
use crate::error::{ConversionError, PipelineError};
use crate::outcome::{FailureKind, UnitOutcome};
use crate::queue::ConversionUnit;
use crate::store::JobStore;

/// Reference budget for a single conversion.
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);

/// What happened to a processed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitDisposition {
    /// The unit's outcome was reported to the barrier.
    Reported(Release),
    /// The job is gone or already terminal; nothing was reported.
    Skipped,
}

pub struct ConversionWorker {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    barrier: Arc<dyn FanInBarrier>,
    converter: Arc<dyn Converter>,
    archiver: ArchiveBuilder,
    timeout: Duration,
}

impl ConversionWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        barrier: Arc<dyn FanInBarrier>,
        converter: Arc<dyn Converter>,
        archiver: ArchiveBuilder,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            barrier,
            converter,
            archiver,
            timeout,
        }
    }

    /// Convert one unit and report its outcome.
    ///
    /// Safe to call again for the same unit: the file's status and output are
    /// overwritten and the barrier counts the unit once. A job that cannot
    /// be loaded fails the unit with [`FailureKind::Storage`]. An `Err` means
    /// the outcome could not be reported; the unit should be requeued.
    pub async fn process(&self, unit: &ConversionUnit) -> Result<UnitDisposition, PipelineError> {
        let job_id = unit.job_id;
        let filename = unit.filename.as_str();

        let outcome = match self.store.find_job(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                tracing::info!(job_id = %job_id, filename, status = %job.status, "Job already terminal, skipping unit");
                return Ok(UnitDisposition::Skipped);
            }
            Ok(None) => {
                tracing::info!(job_id = %job_id, filename, "Job no longer exists, skipping unit");
                return Ok(UnitDisposition::Skipped);
            }
            Ok(Some(_)) => self.run(job_id, filename).await,
            Err(e) => {
                let detail = format!("Could not load job: {e}");
                tracing::error!(job_id = %job_id, filename, error = %e, "Failed to load job for unit");
                self.record_failure(job_id, filename, &detail).await;
                UnitOutcome::failure(filename, FailureKind::Storage, detail)
            }
        };

        let release = report_outcome(self.barrier.as_ref(), &self.archiver, job_id, outcome).await?;
        Ok(UnitDisposition::Reported(release))
    }

    async fn run(&self, job_id: DbId, filename: &str) -> UnitOutcome {
        match self.convert(job_id, filename).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, filename, "File converted");
                UnitOutcome::success(filename)
            }
            Err(e) => {
                let detail = e.to_string();
                tracing::warn!(job_id = %job_id, filename, error = %detail, "File conversion failed");
                self.record_failure(job_id, filename, &detail).await;
                UnitOutcome::failure(filename, e.kind(), detail)
            }
        }
    }

    async fn convert(&self, job_id: DbId, filename: &str) -> Result<(), ConversionError> {
        let input = self
            .blobs
            .get(BlobKey::original(job_id, filename))
            .await?
            .ok_or_else(|| ConversionError::MissingInput(filename.to_string()))?;

        let pdf = tokio::time::timeout(self.timeout, self.converter.convert(&input))
            .await
            .map_err(|_| ConversionError::Timeout(self.timeout))??;

        self.blobs
            .put(BlobKey::converted(job_id, filename), &pdf)
            .await?;
        if !self.store.mark_file_completed(job_id, filename).await? {
            return Err(PipelineError::MissingRecord {
                entity: "File",
                key: format!("{job_id}/{filename}"),
            }
            .into());
        }
        Ok(())
    }

    /// Best effort: the failure is reported to the barrier even if these
    /// writes fail.
    async fn record_failure(&self, job_id: DbId, filename: &str, detail: &str) {
        if let Err(e) = self.blobs.remove(BlobKey::converted(job_id, filename)).await {
            tracing::warn!(job_id = %job_id, filename, error = %e, "Failed to remove converted output");
        }
        if let Err(e) = self.store.mark_file_failed(job_id, filename, detail).await {
            tracing::error!(job_id = %job_id, filename, error = %e, "Failed to record file failure");
        }
    }
}

/// Report an outcome and, if this report released the barrier, run the
/// archive step.
pub(crate) async fn report_outcome(
    barrier: &dyn FanInBarrier,
    archiver: &ArchiveBuilder,
    job_id: DbId,
    outcome: UnitOutcome,
) -> Result<Release, PipelineError> {
    let filename = outcome.filename().to_string();
    let release = barrier.report(job_id, outcome).await?;

    match &release {
        Release::Released(outcomes) => {
            tracing::info!(job_id = %job_id, units = outcomes.len(), "All units reported, assembling archive");
            archiver.finalize(job_id, outcomes.clone()).await?;
        }
        Release::Pending { reported, expected } => {
            tracing::debug!(job_id = %job_id, filename = %filename, reported, expected, "Unit reported");
        }
        Release::AlreadyReleased => {
            tracing::warn!(job_id = %job_id, filename = %filename, "Barrier already released, report ignored");
        }
        Release::Unknown => {
            tracing::warn!(job_id = %job_id, filename = %filename, "No barrier armed for job, report ignored");
        }
    }

    Ok(release)
}
