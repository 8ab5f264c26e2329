//! Job entity model.

use docconv_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table (the `archive` blob is not selected).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
