//! Blob store: original inputs, converted outputs and job archives.
//!
//! Two interchangeable backends: [`DbBlobStore`] embeds the bytes in the
//! job/file rows, [`FsBlobStore`] keeps them under a directory tree.

use async_trait::async_trait;
use docconv_core::types::DbId;

use crate::error::PipelineError;

mod database;
mod filesystem;

pub use database::DbBlobStore;
pub use filesystem::FsBlobStore;

/// Address of one blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKey<'a> {
    Original { job_id: DbId, filename: &'a str },
    Converted { job_id: DbId, filename: &'a str },
    Archive { job_id: DbId },
}

impl<'a> BlobKey<'a> {
    pub fn original(job_id: DbId, filename: &'a str) -> Self {
        Self::Original { job_id, filename }
    }

    pub fn converted(job_id: DbId, filename: &'a str) -> Self {
        Self::Converted { job_id, filename }
    }

    pub fn archive(job_id: DbId) -> Self {
        Self::Archive { job_id }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write (or overwrite) a blob.
    async fn put(&self, key: BlobKey<'_>, data: &[u8]) -> Result<(), PipelineError>;

    /// Read a blob; `None` when it does not exist.
    async fn get(&self, key: BlobKey<'_>) -> Result<Option<Vec<u8>>, PipelineError>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn remove(&self, key: BlobKey<'_>) -> Result<(), PipelineError>;

    /// Remove everything stored for a job.
    async fn purge_job(&self, job_id: DbId) -> Result<(), PipelineError>;
}
