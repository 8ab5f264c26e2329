//! Archive assembly: runs once per job, on barrier release.
//!
//! Only successful outcomes are packaged. A job with no successes, or whose
//! archive cannot be built or stored, ends `FAILED` without an archive.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use docconv_core::naming::{output_name, unique_entry_name};
use docconv_core::types::DbId;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::blob::{BlobKey, BlobStore};
use crate::error::PipelineError;
use crate::outcome::UnitOutcome;
use crate::tracker::StatusTracker;

/// Final state reached by [`ArchiveBuilder::finalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// Archive stored; job `COMPLETED`.
    Completed { entries: usize },
    /// No archive; job `FAILED`.
    Failed,
}

#[derive(Clone)]
pub struct ArchiveBuilder {
    blobs: Arc<dyn BlobStore>,
    tracker: StatusTracker,
}

impl ArchiveBuilder {
    pub fn new(blobs: Arc<dyn BlobStore>, tracker: StatusTracker) -> Self {
        Self { blobs, tracker }
    }

    /// Build and store the archive for `job_id` from the released outcome
    /// set, then seal the job.
    pub async fn finalize(
        &self,
        job_id: DbId,
        outcomes: Vec<UnitOutcome>,
    ) -> Result<Finalized, PipelineError> {
        match self.assemble(job_id, &outcomes).await {
            Ok(finalized) => Ok(finalized),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Archive assembly failed");
                if let Err(cleanup) = self.blobs.remove(BlobKey::archive(job_id)).await {
                    tracing::warn!(job_id = %job_id, error = %cleanup, "Failed to remove partial archive");
                }
                self.tracker
                    .mark_failed(job_id, "archive could not be built or stored")
                    .await?;
                Ok(Finalized::Failed)
            }
        }
    }

    async fn assemble(
        &self,
        job_id: DbId,
        outcomes: &[UnitOutcome],
    ) -> Result<Finalized, PipelineError> {
        let succeeded: Vec<&str> = outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(UnitOutcome::filename)
            .collect();

        if succeeded.is_empty() {
            self.tracker
                .mark_failed(job_id, "no file converted successfully")
                .await?;
            return Ok(Finalized::Failed);
        }

        let mut entries = Vec::with_capacity(succeeded.len());
        for filename in succeeded {
            match self.blobs.get(BlobKey::converted(job_id, filename)).await? {
                Some(data) => entries.push((output_name(filename), data)),
                None => tracing::warn!(
                    job_id = %job_id,
                    filename,
                    "Converted output missing for successful file, skipping",
                ),
            }
        }

        if entries.is_empty() {
            self.tracker
                .mark_failed(job_id, "no converted output available")
                .await?;
            return Ok(Finalized::Failed);
        }

        let count = entries.len();
        let archive = tokio::task::spawn_blocking(move || build_zip(entries)).await??;
        self.blobs.put(BlobKey::archive(job_id), &archive).await?;

        if !self.tracker.mark_completed(job_id).await? {
            // The job left IN_PROGRESS underneath us; an archive must not
            // outlive a non-COMPLETED job.
            self.blobs.remove(BlobKey::archive(job_id)).await?;
            return Ok(Finalized::Failed);
        }

        tracing::info!(job_id = %job_id, entries = count, bytes = archive.len(), "Archive stored");
        Ok(Finalized::Completed { entries: count })
    }
}

/// Write `(entry_name, bytes)` pairs into a DEFLATE-compressed ZIP.
/// Colliding entry names are made unique.
pub fn build_zip(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut taken = HashSet::with_capacity(entries.len());

    for (name, data) in entries {
        let name = unique_entry_name(&name, &mut taken);
        zip.start_file(name, options)?;
        zip.write_all(&data)?;
    }

    Ok(zip.finish()?.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
