//! Repository for the `files` table.
//!
//! Rows are addressed by `(job_id, original_filename)`, the correlation key
//! carried by every conversion unit.

use docconv_core::types::{new_id, DbId};
use sqlx::PgPool;

use crate::models::file::{CreateFile, JobFile};
use crate::models::status::FileStatus;

/// Column list for `files` queries.
const COLUMNS: &str = "\
    id, job_id, original_filename, status_id, error_message, \
    created_at, updated_at";

/// Provides CRUD operations for job files.
pub struct FileRepo;

impl FileRepo {
    /// Insert a `PENDING` file record.
    pub async fn create(pool: &PgPool, input: &CreateFile) -> Result<JobFile, sqlx::Error> {
        let query = format!(
            "INSERT INTO files (id, job_id, original_filename, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobFile>(&query)
            .bind(new_id())
            .bind(input.job_id)
            .bind(&input.original_filename)
            .bind(FileStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find one file of a job by its original filename.
    pub async fn find(
        pool: &PgPool,
        job_id: DbId,
        filename: &str,
    ) -> Result<Option<JobFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM files WHERE job_id = $1 AND original_filename = $2"
        );
        sqlx::query_as::<_, JobFile>(&query)
            .bind(job_id)
            .bind(filename)
            .fetch_optional(pool)
            .await
    }

    /// List all files of a job in upload order.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM files WHERE job_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, JobFile>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Record a successful conversion and clear any earlier error.
    pub async fn mark_completed(
        pool: &PgPool,
        job_id: DbId,
        filename: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE files SET status_id = $3, error_message = NULL, updated_at = NOW() \
             WHERE job_id = $1 AND original_filename = $2",
        )
        .bind(job_id)
        .bind(filename)
        .bind(FileStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed conversion with its error description.
    pub async fn mark_failed(
        pool: &PgPool,
        job_id: DbId,
        filename: &str,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE files SET status_id = $3, error_message = $4, updated_at = NOW() \
             WHERE job_id = $1 AND original_filename = $2",
        )
        .bind(job_id)
        .bind(filename)
        .bind(FileStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
