use async_trait::async_trait;
use docconv_core::types::DbId;
use docconv_db::repositories::{BlobRepo, FileBlob};
use docconv_db::DbPool;

use super::{BlobKey, BlobStore};
use crate::error::PipelineError;

/// [`BlobStore`] embedded in the `files` / `jobs` rows.
///
/// Blobs can only be written for rows that exist; they disappear with the
/// row when a job is deleted.
#[derive(Clone)]
pub struct DbBlobStore {
    pool: DbPool,
}

impl DbBlobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn write(&self, key: BlobKey<'_>, data: Option<&[u8]>) -> Result<bool, PipelineError> {
        let written = match key {
            BlobKey::Original { job_id, filename } => {
                BlobRepo::put_file_blob(&self.pool, job_id, filename, FileBlob::Original, data)
                    .await?
            }
            BlobKey::Converted { job_id, filename } => {
                BlobRepo::put_file_blob(&self.pool, job_id, filename, FileBlob::Converted, data)
                    .await?
            }
            BlobKey::Archive { job_id } => BlobRepo::put_archive(&self.pool, job_id, data).await?,
        };
        Ok(written)
    }
}

fn missing_row(key: BlobKey<'_>) -> PipelineError {
    match key {
        BlobKey::Original { job_id, filename } | BlobKey::Converted { job_id, filename } => {
            PipelineError::MissingRecord {
                entity: "File",
                key: format!("{job_id}/{filename}"),
            }
        }
        BlobKey::Archive { job_id } => PipelineError::MissingRecord {
            entity: "Job",
            key: job_id.to_string(),
        },
    }
}

#[async_trait]
impl BlobStore for DbBlobStore {
    async fn put(&self, key: BlobKey<'_>, data: &[u8]) -> Result<(), PipelineError> {
        if self.write(key, Some(data)).await? {
            Ok(())
        } else {
            Err(missing_row(key))
        }
    }

    async fn get(&self, key: BlobKey<'_>) -> Result<Option<Vec<u8>>, PipelineError> {
        let data = match key {
            BlobKey::Original { job_id, filename } => {
                BlobRepo::get_file_blob(&self.pool, job_id, filename, FileBlob::Original).await?
            }
            BlobKey::Converted { job_id, filename } => {
                BlobRepo::get_file_blob(&self.pool, job_id, filename, FileBlob::Converted).await?
            }
            BlobKey::Archive { job_id } => BlobRepo::get_archive(&self.pool, job_id).await?,
        };
        Ok(data)
    }

    async fn remove(&self, key: BlobKey<'_>) -> Result<(), PipelineError> {
        self.write(key, None).await?;
        Ok(())
    }

    async fn purge_job(&self, _job_id: DbId) -> Result<(), PipelineError> {
        // Rows (and their blobs) are removed by the job delete cascade.
        Ok(())
    }
}
