use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use docconv_core::error::CoreError;
use docconv_core::naming::base_name;
use docconv_core::types::DbId;

use super::{BlobKey, BlobStore};
use crate::error::PipelineError;

/// [`BlobStore`] under a root directory:
///
/// ```text
/// {root}/{job_id}/original/{filename}
/// {root}/{job_id}/converted/{filename}
/// {root}/{job_id}/archive.zip
/// ```
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn job_dir(&self, job_id: DbId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn path_for(&self, key: BlobKey<'_>) -> Result<PathBuf, PipelineError> {
        let path = match key {
            BlobKey::Original { job_id, filename } => self
                .job_dir(job_id)
                .join("original")
                .join(checked_name(filename)?),
            BlobKey::Converted { job_id, filename } => self
                .job_dir(job_id)
                .join("converted")
                .join(checked_name(filename)?),
            BlobKey::Archive { job_id } => self.job_dir(job_id).join("archive.zip"),
        };
        Ok(path)
    }
}

/// Reject anything that is not a bare file name so a key can never escape
/// its job directory.
fn checked_name(filename: &str) -> Result<&str, PipelineError> {
    match base_name(filename) {
        Some(name) if name == filename => Ok(name),
        _ => Err(CoreError::Validation(format!("Invalid blob filename: {filename:?}")).into()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: BlobKey<'_>, data: &[u8]) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a torn blob.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: BlobKey<'_>) -> Result<Option<Vec<u8>>, PipelineError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: BlobKey<'_>) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn purge_job(&self, job_id: DbId) -> Result<(), PipelineError> {
        match tokio::fs::remove_dir_all(self.job_dir(job_id)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
