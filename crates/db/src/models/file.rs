//! File entity model and create DTO.

use docconv_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::FileStatus;

/// A row from the `files` table (blob columns are not selected).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobFile {
    pub id: DbId,
    pub job_id: DbId,
    pub original_filename: String,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering an accepted upload under a job.
#[derive(Debug, Clone)]
pub struct CreateFile {
    pub job_id: DbId,
    pub original_filename: String,
}
